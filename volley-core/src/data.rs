use std::path::PathBuf;
use std::sync::Arc;

use crate::model::DataFile;
use crate::scope::Variables;
use volley_value::Value;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("data file `{name}` ({}): {source}", .path.display())]
    Csv {
        name: String,
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error("data file `{name}` ({}) has no rows", .path.display())]
    Empty { name: String, path: PathBuf },

    #[error("data file `{name}` is declared more than once")]
    Duplicate { name: String },

    #[error("loading data files failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// The rows of one data file, each row a variables layer keyed by column name.
#[derive(Debug, Clone)]
pub struct DataRows {
    name: Arc<str>,
    rows: Vec<Arc<Variables>>,
}

impl DataRows {
    pub fn new(name: impl Into<Arc<str>>, rows: Vec<Variables>) -> Self {
        Self {
            name: name.into(),
            rows: rows.into_iter().map(Arc::new).collect(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Row feeding pass `iteration`. Wraps once iterations outrun the rows.
    pub fn row(&self, iteration: u64) -> Option<&Variables> {
        if self.rows.is_empty() {
            return None;
        }
        let idx = (iteration % self.rows.len() as u64) as usize;
        self.rows.get(idx).map(|r| &**r)
    }
}

/// Read a headed CSV file. Cells are trimmed; short rows are allowed.
pub fn read_csv(file: &DataFile) -> Result<DataRows> {
    let csv_err = |source| Error::Csv {
        name: file.name.clone(),
        path: file.path.clone(),
        source,
    };

    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .flexible(true)
        .from_path(&file.path)
        .map_err(csv_err)?;

    let headers: Vec<Arc<str>> = reader
        .headers()
        .map_err(csv_err)?
        .iter()
        .map(Arc::from)
        .collect();

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record.map_err(csv_err)?;
        let row: Variables = headers
            .iter()
            .zip(record.iter())
            .map(|(h, v)| (h.clone(), Value::from(v)))
            .collect();
        rows.push(row);
    }

    if rows.is_empty() {
        return Err(Error::Empty {
            name: file.name.clone(),
            path: file.path.clone(),
        });
    }

    tracing::debug!(
        data_file = %file.name,
        path = %file.path.display(),
        rows = rows.len(),
        "loaded data file"
    );
    Ok(DataRows::new(file.name.as_str(), rows))
}

/// Load every file off the async runtime, in declaration order.
pub async fn load_all(files: &[DataFile]) -> Result<Vec<DataRows>> {
    let mut seen = ahash::AHashSet::new();
    for f in files {
        if !seen.insert(f.name.as_str()) {
            return Err(Error::Duplicate {
                name: f.name.clone(),
            });
        }
    }

    let mut out = Vec::with_capacity(files.len());
    for file in files {
        let file = file.clone();
        out.push(tokio::task::spawn_blocking(move || read_csv(&file)).await??);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use std::io::Write;

    use super::*;

    fn csv_file(contents: &str) -> tempfile::NamedTempFile {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(contents.as_bytes()).unwrap();
        f
    }

    #[test]
    fn rows_are_keyed_by_header_and_wrap() {
        let f = csv_file("user, password\nalice, a1\nbob,b2\n");
        let rows = read_csv(&DataFile::new("users", f.path())).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows.name(), "users");

        let user = |i| {
            rows.row(i)
                .and_then(|r| r.get("user"))
                .and_then(Value::as_text)
                .map(str::to_string)
        };
        assert_eq!(user(0).as_deref(), Some("alice"));
        assert_eq!(user(1).as_deref(), Some("bob"));
        assert_eq!(user(2).as_deref(), Some("alice"));
        assert_eq!(
            rows.row(1).and_then(|r| r.get("password")).and_then(Value::as_text),
            Some("b2")
        );
    }

    #[test]
    fn missing_and_empty_files_are_errors() {
        let missing = read_csv(&DataFile::new("gone", "/definitely/not/here.csv")).unwrap_err();
        assert!(matches!(missing, Error::Csv { .. }));

        let f = csv_file("only,headers\n");
        let empty = read_csv(&DataFile::new("empty", f.path())).unwrap_err();
        assert!(matches!(empty, Error::Empty { .. }));
    }

    #[tokio::test]
    async fn load_all_rejects_duplicate_names() {
        let f = csv_file("a\n1\n");
        let files = vec![DataFile::new("d", f.path()), DataFile::new("d", f.path())];
        assert!(matches!(
            load_all(&files).await,
            Err(Error::Duplicate { .. })
        ));

        let loaded = load_all(&files[..1]).await.unwrap();
        assert_eq!(loaded.len(), 1);
    }
}
