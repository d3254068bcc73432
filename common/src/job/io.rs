// Ready-made readers and writers for chunk steps

use crate::errors::StepExecutionError;
use crate::job::chunk::{ItemReader, ItemReaderFactory, ItemWriter};
use crate::job::step::StepContext;
use async_trait::async_trait;
use std::path::PathBuf;
use tokio::fs::File;
use tokio::io::{AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader, Lines, Stdout};
use tokio::sync::Mutex;
use tracing::debug;

/// Opens the file named by a job parameter and yields its lines
#[derive(Debug, Clone)]
pub struct FileLineReaderFactory {
    parameter: String,
}

impl FileLineReaderFactory {
    pub fn new(parameter: impl Into<String>) -> Self {
        Self {
            parameter: parameter.into(),
        }
    }
}

struct FileLineReader {
    lines: Lines<BufReader<File>>,
}

#[async_trait]
impl ItemReader<String> for FileLineReader {
    async fn read(&mut self) -> Result<Option<String>, StepExecutionError> {
        self.lines
            .next_line()
            .await
            .map_err(|e| StepExecutionError::Read(e.to_string()))
    }
}

#[async_trait]
impl ItemReaderFactory<String> for FileLineReaderFactory {
    async fn open(
        &self,
        context: &StepContext,
    ) -> Result<Box<dyn ItemReader<String>>, StepExecutionError> {
        let path = PathBuf::from(context.require_parameter(&self.parameter)?);
        let file = File::open(&path)
            .await
            .map_err(|e| StepExecutionError::Read(format!("{}: {}", path.display(), e)))?;

        debug!(
            execution_id = %context.execution_id,
            path = %path.display(),
            "Opened input file"
        );

        Ok(Box::new(FileLineReader {
            lines: BufReader::new(file).lines(),
        }))
    }
}

/// Serves a fixed list of items to every execution
#[derive(Debug, Clone)]
pub struct ListItemReaderFactory<T> {
    items: Vec<T>,
}

impl<T> ListItemReaderFactory<T> {
    pub fn new(items: Vec<T>) -> Self {
        Self { items }
    }
}

struct ListItemReader<T> {
    items: std::vec::IntoIter<T>,
}

#[async_trait]
impl<T: Send> ItemReader<T> for ListItemReader<T> {
    async fn read(&mut self) -> Result<Option<T>, StepExecutionError> {
        Ok(self.items.next())
    }
}

#[async_trait]
impl<T> ItemReaderFactory<T> for ListItemReaderFactory<T>
where
    T: Clone + Send + Sync + 'static,
{
    async fn open(&self, _context: &StepContext) -> Result<Box<dyn ItemReader<T>>, StepExecutionError> {
        Ok(Box::new(ListItemReader {
            items: self.items.clone().into_iter(),
        }))
    }
}

/// Writes each item on its own line; a chunk is flushed as one unit
pub struct LineItemWriter<W> {
    out: Mutex<W>,
}

impl LineItemWriter<Stdout> {
    pub fn stdout() -> Self {
        Self::new(tokio::io::stdout())
    }
}

impl<W> LineItemWriter<W> {
    pub fn new(out: W) -> Self {
        Self {
            out: Mutex::new(out),
        }
    }

    pub fn into_inner(self) -> W {
        self.out.into_inner()
    }
}

impl LineItemWriter<Vec<u8>> {
    /// Everything written so far, for in-memory sinks
    pub async fn contents(&self) -> String {
        String::from_utf8_lossy(&self.out.lock().await).into_owned()
    }
}

#[async_trait]
impl<W, T> ItemWriter<T> for LineItemWriter<W>
where
    W: AsyncWrite + Unpin + Send,
    T: std::fmt::Display + Sync,
{
    async fn write(&self, items: &[T]) -> Result<(), StepExecutionError> {
        let mut buf = String::new();
        for item in items {
            buf.push_str(&item.to_string());
            buf.push('\n');
        }

        let mut out = self.out.lock().await;
        out.write_all(buf.as_bytes())
            .await
            .map_err(|e| StepExecutionError::Write(e.to_string()))?;
        out.flush()
            .await
            .map_err(|e| StepExecutionError::Write(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{JobExecution, JobParameters};
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn context_for(params: JobParameters) -> StepContext {
        let execution = JobExecution::start("exampleJob", params);
        StepContext::new(&execution, "exampleStep")
    }

    async fn drain(reader: &mut Box<dyn ItemReader<String>>) -> Vec<String> {
        let mut lines = Vec::new();
        while let Some(line) = reader.read().await.unwrap() {
            lines.push(line);
        }
        lines
    }

    #[tokio::test]
    async fn test_file_reader_yields_lines() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "alpha\nbeta\ngamma\n").unwrap();

        let ctx = context_for(
            JobParameters::new().with("file_path", file.path().to_string_lossy()),
        );
        let mut reader = FileLineReaderFactory::new("file_path").open(&ctx).await.unwrap();

        assert_eq!(drain(&mut reader).await, vec!["alpha", "beta", "gamma"]);
    }

    #[tokio::test]
    async fn test_file_reader_without_parameter() {
        let ctx = context_for(JobParameters::new());
        let err = FileLineReaderFactory::new("file_path")
            .open(&ctx)
            .await
            .err()
            .unwrap();
        assert!(matches!(err, StepExecutionError::MissingParameter(_)));
    }

    #[tokio::test]
    async fn test_file_reader_missing_file() {
        let ctx = context_for(JobParameters::new().with("file_path", "/nonexistent/input.txt"));
        let err = FileLineReaderFactory::new("file_path")
            .open(&ctx)
            .await
            .err()
            .unwrap();
        assert!(matches!(err, StepExecutionError::Read(_)));
    }

    #[tokio::test]
    async fn test_list_reader_is_fresh_per_open() {
        let factory = ListItemReaderFactory::new(vec![1, 2]);
        let ctx = context_for(JobParameters::new());
        for _ in 0..2 {
            let mut reader = factory.open(&ctx).await.unwrap();
            assert_eq!(reader.read().await.unwrap(), Some(1));
            assert_eq!(reader.read().await.unwrap(), Some(2));
            assert_eq!(reader.read().await.unwrap(), None);
        }
    }

    #[tokio::test]
    async fn test_line_writer_appends_chunks() {
        let writer = LineItemWriter::new(Vec::new());
        writer.write(&["a", "b"]).await.unwrap();
        writer.write(&["c"]).await.unwrap();
        assert_eq!(writer.contents().await, "a\nb\nc\n");
    }
}
