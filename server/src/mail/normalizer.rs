use mail_parser::{MessageParser, PartType};

/// One plain-text body part of an inbox message, with its decoded headers.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct MailRecord {
    pub from: String,
    pub subject: String,
    pub body: String,
}

/// Turn one raw RFC 5322 message into zero or more records, one per
/// plain-text body part. Header encoded words are decoded, body charsets
/// fall back to replacement characters. HTML parts are never converted to
/// text; a message with no plain-text part, like unparseable input, yields
/// no records.
pub fn normalize_message(raw: &[u8]) -> Vec<MailRecord> {
    let Some(msg) = MessageParser::default().parse(raw) else {
        return Vec::new();
    };

    let from = msg
        .from()
        .and_then(|f| f.first())
        .map(|addr| match (addr.name(), addr.address()) {
            (Some(name), Some(address)) => format!("{} <{}>", name, address),
            (None, Some(address)) => address.to_string(),
            (Some(name), None) => name.to_string(),
            (None, None) => String::new(),
        })
        .unwrap_or_default();
    let subject = msg.subject().unwrap_or_default().to_string();

    msg.text_body
        .iter()
        .filter_map(|&id| msg.part(id))
        .filter_map(|part| match &part.body {
            PartType::Text(text) => Some(MailRecord {
                from: from.clone(),
                subject: subject.clone(),
                body: text.as_ref().to_string(),
            }),
            _ => None,
        })
        .collect()
}
