//! Corpus file export and loading.
//!
//! The corpus is a three column CSV (`From,Subject,Body`, header row
//! required) that is fully overwritten on every ingest run.

use std::fs::File;
use std::io::Write;
use std::path::Path;

use anyhow::Context;

use super::normalizer::MailRecord;

const HEADER: &str = "From,Subject,Body";

/// One corpus row prepared for chunking and embedding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CorpusDocument {
    /// Zero-based data row index in the corpus file.
    pub row: usize,
    pub text: String,
}

/// Write all records to the corpus file, truncating any prior content.
pub fn write_corpus(path: &Path, records: &[MailRecord]) -> anyhow::Result<()> {
    let mut file = File::create(path)
        .with_context(|| format!("Could not create corpus file {}", path.display()))?;

    writeln!(file, "{HEADER}")?;
    for record in records {
        writeln!(
            file,
            "{},{},{}",
            csv_escape(&record.from),
            csv_escape(&record.subject),
            csv_escape(&record.body),
        )?;
    }
    file.flush()?;

    Ok(())
}

/// Load the corpus file into documents, one per data row.
///
/// Each document's text lays the columns out as labeled lines so the chunker
/// and retriever see sender and subject alongside the body. A header-only
/// corpus loads as an empty document list. Rows with the wrong column count
/// are skipped.
pub fn load_corpus(path: &Path) -> anyhow::Result<Vec<CorpusDocument>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Could not read corpus file {}", path.display()))?;

    let mut rows = parse_csv(&content).into_iter();
    let header = rows.next().context("Corpus file is missing its header row")?;
    if header != ["From", "Subject", "Body"] {
        anyhow::bail!("Corpus file has an unexpected header: {:?}", header);
    }

    let mut documents = Vec::new();
    for (row, fields) in rows.enumerate() {
        let [from, subject, body]: [String; 3] = match fields.try_into() {
            Ok(fields) => fields,
            Err(fields) => {
                tracing::warn!("Skipping corpus row {} with {} fields", row, fields.len());
                continue;
            }
        };
        documents.push(CorpusDocument {
            row,
            text: format!("From: {}\nSubject: {}\nBody: {}", from, subject, body),
        });
    }

    Ok(documents)
}

/// Escape a value for CSV (RFC 4180).
///
/// Wraps in double quotes if the value contains commas, quotes, or newlines.
fn csv_escape(value: &str) -> String {
    if value.contains(',') || value.contains('"') || value.contains('\n') || value.contains('\r') {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

/// Parse CSV text into rows of fields (RFC 4180: quoted fields may contain
/// commas, doubled quotes, and line breaks). Blank lines are dropped.
fn parse_csv(input: &str) -> Vec<Vec<String>> {
    let mut rows = Vec::new();
    let mut row: Vec<String> = Vec::new();
    let mut field = String::new();
    let mut in_quotes = false;
    let mut chars = input.chars().peekable();

    while let Some(c) = chars.next() {
        if in_quotes {
            if c == '"' {
                if chars.peek() == Some(&'"') {
                    chars.next();
                    field.push('"');
                } else {
                    in_quotes = false;
                }
            } else {
                field.push(c);
            }
        } else {
            match c {
                '"' if field.is_empty() => in_quotes = true,
                ',' => row.push(std::mem::take(&mut field)),
                '\r' => {
                    if chars.peek() == Some(&'\n') {
                        chars.next();
                    }
                    row.push(std::mem::take(&mut field));
                    rows.push(std::mem::take(&mut row));
                }
                '\n' => {
                    row.push(std::mem::take(&mut field));
                    rows.push(std::mem::take(&mut row));
                }
                _ => field.push(c),
            }
        }
    }
    if !field.is_empty() || !row.is_empty() {
        row.push(field);
        rows.push(row);
    }

    rows.retain(|r| !(r.len() == 1 && r[0].is_empty()));
    rows
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::common::temp_path;

    #[test]
    fn test_csv_escape_simple() {
        assert_eq!(csv_escape("hello"), "hello");
    }

    #[test]
    fn test_csv_escape_comma() {
        assert_eq!(csv_escape("hello, world"), "\"hello, world\"");
    }

    #[test]
    fn test_csv_escape_quotes() {
        assert_eq!(csv_escape("say \"hi\""), "\"say \"\"hi\"\"\"");
    }

    #[test]
    fn test_csv_escape_newline() {
        assert_eq!(csv_escape("line1\nline2"), "\"line1\nline2\"");
    }

    #[test]
    fn test_parse_csv_quoted_fields() {
        let rows = parse_csv("a,\"b, with comma\",c\n\"multi\nline\",\"he said \"\"hi\"\"\",z\n");
        assert_eq!(
            rows,
            vec![
                vec!["a", "b, with comma", "c"],
                vec!["multi\nline", "he said \"hi\"", "z"],
            ]
        );
    }

    #[test]
    fn test_write_then_load_round_trip() {
        let path = temp_path("corpus_round_trip.csv");
        let records = vec![
            MailRecord {
                from: "Alice <alice@example.com>".to_string(),
                subject: "Hello, again".to_string(),
                body: "First line.\nSecond line, with a comma and \"quotes\".".to_string(),
            },
            MailRecord {
                from: "bob@example.com".to_string(),
                subject: "Plain".to_string(),
                body: "Short body".to_string(),
            },
        ];

        write_corpus(&path, &records).unwrap();
        let documents = load_corpus(&path).unwrap();
        std::fs::remove_file(&path).ok();

        assert_eq!(documents.len(), 2);
        assert_eq!(documents[0].row, 0);
        assert_eq!(
            documents[0].text,
            "From: Alice <alice@example.com>\nSubject: Hello, again\nBody: First line.\nSecond line, with a comma and \"quotes\"."
        );
        assert_eq!(
            documents[1].text,
            "From: bob@example.com\nSubject: Plain\nBody: Short body"
        );
    }

    #[test]
    fn test_header_only_corpus_loads_empty() {
        let path = temp_path("corpus_header_only.csv");
        write_corpus(&path, &[]).unwrap();
        let documents = load_corpus(&path).unwrap();
        std::fs::remove_file(&path).ok();

        assert!(documents.is_empty());
    }

    #[test]
    fn test_missing_corpus_is_an_error() {
        let path = temp_path("corpus_that_does_not_exist.csv");
        assert!(load_corpus(&path).is_err());
    }
}
