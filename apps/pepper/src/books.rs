use std::path::{Path, PathBuf};

use pepper_core::Book;
use serde_json::Value;
use thiserror::Error;
use tracing::{info, warn};

#[derive(Debug, Error)]
pub enum BookError {
    #[error("failed to read {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("invalid book JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("book file must contain a JSON array")]
    NotAnArray,
}

/// Parses a JSON array of books. Entries that do not describe a book are
/// skipped with a warning; the rest of the shelf still loads.
pub fn parse_books(raw: &str) -> Result<Vec<Book>, BookError> {
    match serde_json::from_str::<Value>(raw)? {
        Value::Array(entries) => Ok(collect_books(entries)),
        _ => Err(BookError::NotAnArray),
    }
}

pub fn load_books(path: &Path) -> Result<Vec<Book>, BookError> {
    let raw = std::fs::read_to_string(path).map_err(|source| BookError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    parse_books(&raw)
}

fn collect_books(entries: Vec<Value>) -> Vec<Book> {
    entries
        .into_iter()
        .enumerate()
        .filter_map(|(idx, entry)| match serde_json::from_value::<Book>(entry) {
            Ok(book) => Some(book),
            Err(err) => {
                warn!(entry = idx, error = %err, "skipping malformed book");
                None
            }
        })
        .collect()
}

/// Books from `path`, or the built-in shelf when there is no usable file.
pub fn load_shelf(path: Option<&Path>) -> Vec<Book> {
    let Some(path) = path else {
        return Book::default_shelf();
    };
    match load_books(path) {
        Ok(books) if !books.is_empty() => {
            info!(path = %path.display(), count = books.len(), "loaded books");
            books
        }
        Ok(_) => {
            warn!(path = %path.display(), "book file is empty, using default shelf");
            Book::default_shelf()
        }
        Err(err) => {
            warn!(path = %path.display(), error = %err, "using default shelf");
            Book::default_shelf()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_file(name: &str, contents: &str) -> PathBuf {
        let path = std::env::temp_dir().join(format!("pepper-{}-{name}", std::process::id()));
        std::fs::write(&path, contents).unwrap();
        path
    }

    #[test]
    fn skips_malformed_entries() {
        let raw = r#"[
            {"id":"b1","title":"One","author":"A","type":"Fantasy",
             "chapters":[{"index":1,"title":"Ch 1","content":"hello"}]},
            {"id":"b2","title":"Missing author"},
            {"id":"b3","title":"Three","author":"C","type":"Mystery","readChapters":2}
        ]"#;
        let books = parse_books(raw).unwrap();
        assert_eq!(books.len(), 2);
        assert_eq!(books[0].chapters[0].content, "hello");
        assert!(!books[0].chapters[0].had_read);
        assert_eq!(books[1].read_chapters, 2);
    }

    #[test]
    fn invalid_json_is_an_error() {
        assert!(matches!(parse_books("[{"), Err(BookError::Json(_))));
        assert!(matches!(
            parse_books(r#"{"id":"b1"}"#),
            Err(BookError::NotAnArray)
        ));
    }

    #[test]
    fn object_file_is_rejected() {
        let path = temp_file("object.json", r#"{"id":"b1"}"#);
        let result = load_books(&path);
        let _ = std::fs::remove_file(&path);
        assert!(matches!(result, Err(BookError::NotAnArray)));
    }

    #[test]
    fn shelf_falls_back_to_defaults() {
        assert_eq!(load_shelf(None), Book::default_shelf());

        let missing = std::env::temp_dir().join("pepper-missing-books.json");
        assert_eq!(load_shelf(Some(&missing)), Book::default_shelf());

        let empty = temp_file("empty.json", "[]");
        let shelf = load_shelf(Some(&empty));
        let _ = std::fs::remove_file(&empty);
        assert_eq!(shelf[0].id, "book_001");
    }

    #[test]
    fn shelf_loads_from_file() {
        let path = temp_file(
            "shelf.json",
            r#"[{"id":"x","title":"X","author":"Y","type":"Z"}]"#,
        );
        let shelf = load_shelf(Some(&path));
        let _ = std::fs::remove_file(&path);
        assert_eq!(shelf.len(), 1);
        assert_eq!(shelf[0].byline(), "X -- Y");
    }
}
