use futures::StreamExt;
use tokio::net::TcpStream;
use tokio_native_tls::native_tls::TlsConnector;

use crate::error::{AppError, AppResult};
use crate::server_config::cfg;

/// IMAP client for the configured inbox. A fresh session is established per
/// fetch and logged out afterwards.
#[derive(Clone)]
pub struct InboxClient {
    host: String,
    port: u16,
    address: String,
    password: String,
    mailbox: String,
}

impl InboxClient {
    pub fn new(host: String, port: u16, address: String, password: String, mailbox: String) -> Self {
        Self {
            host,
            port,
            address,
            password,
            mailbox,
        }
    }

    pub fn from_config() -> Self {
        Self::new(
            cfg.imap.host.clone(),
            cfg.imap.port,
            cfg.email_address.clone(),
            cfg.email_password.clone(),
            cfg.imap.mailbox.clone(),
        )
    }

    /// Fetch the raw bytes of every unseen message in the mailbox.
    ///
    /// The fetch uses `BODY[]` without PEEK, so each returned message is
    /// marked `\Seen` and will not be picked up again on the next run.
    pub async fn fetch_unread(&self) -> AppResult<Vec<Vec<u8>>> {
        let tcp = TcpStream::connect((self.host.as_str(), self.port))
            .await
            .map_err(|e| AppError::Mailbox(format!("connect to {} failed: {}", self.host, e)))?;
        let tls = TlsConnector::builder()
            .build()
            .map_err(|e| AppError::Mailbox(format!("tls setup failed: {}", e)))?;
        let tls = tokio_native_tls::TlsConnector::from(tls);
        let tls_stream = tls
            .connect(&self.host, tcp)
            .await
            .map_err(|e| AppError::Mailbox(format!("tls handshake failed: {}", e)))?;

        let client = async_imap::Client::new(tls_stream);
        let mut session = client
            .login(&self.address, &self.password)
            .await
            .map_err(|(e, _)| AppError::Mailbox(format!("login failed: {:?}", e)))?;

        session.select(&self.mailbox).await?;

        let mut uids: Vec<u32> = session.uid_search("UNSEEN").await?.into_iter().collect();
        uids.sort_unstable();

        if uids.is_empty() {
            tracing::info!("No unseen messages in {}", self.mailbox);
            let _ = session.logout().await;
            return Ok(Vec::new());
        }

        let seq = uids
            .iter()
            .map(|u| u.to_string())
            .collect::<Vec<_>>()
            .join(",");
        tracing::info!("Fetching {} unseen messages", uids.len());

        let mut raw_messages = Vec::new();
        {
            let mut fetches = session.uid_fetch(&seq, "UID BODY[]").await?;
            while let Some(item) = fetches.next().await {
                let fetch = item?;
                if let Some(body) = fetch.body() {
                    raw_messages.push(body.to_vec());
                } else {
                    tracing::warn!("Fetch for uid {:?} returned no body", fetch.uid);
                }
            }
        }

        let _ = session.logout().await;

        Ok(raw_messages)
    }
}

#[cfg(test)]
mod tests {
    #[cfg(feature = "integration")]
    use super::*;

    #[test]
    fn test_session_stream_satisfies_imap_transport_bounds() {
        fn open(
            stream: tokio_native_tls::TlsStream<tokio::net::TcpStream>,
        ) -> async_imap::Client<tokio_native_tls::TlsStream<tokio::net::TcpStream>> {
            async_imap::Client::new(stream)
        }
        let _ = open;
    }

    #[cfg(feature = "integration")]
    #[tokio::test]
    async fn test_fetch_unread_from_live_inbox() {
        dotenvy::dotenv().ok();
        let client = InboxClient::from_config();
        let messages = client.fetch_unread().await.expect("fetch failed");
        println!("Fetched {} unseen messages", messages.len());
    }
}
