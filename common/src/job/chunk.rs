// Chunk-oriented step: read items up to the commit interval, process them,
// write the chunk once, repeat until the reader is exhausted.

use crate::errors::{JobDefinitionError, StepExecutionError};
use crate::job::step::{ensure_name, StepContext};
use crate::models::StepExecution;
use crate::retry::RetryStrategy;
use async_trait::async_trait;
use std::marker::PhantomData;
use std::num::NonZeroUsize;
use std::sync::Arc;
use tracing::{debug, warn};

/// Yields items one at a time; `Ok(None)` marks end of input
#[async_trait]
pub trait ItemReader<T>: Send {
    async fn read(&mut self) -> Result<Option<T>, StepExecutionError>;
}

/// Opens a fresh reader for each step execution, bound to that execution's parameters
#[async_trait]
pub trait ItemReaderFactory<T>: Send + Sync {
    async fn open(&self, context: &StepContext) -> Result<Box<dyn ItemReader<T>>, StepExecutionError>;
}

/// Transforms one item; `Ok(None)` filters it out of the chunk
#[async_trait]
pub trait ItemProcessor<I, O>: Send + Sync {
    async fn process(&self, item: I) -> Result<Option<O>, StepExecutionError>;
}

/// Writes one whole chunk. A returned error fails the step; earlier chunks stay written.
#[async_trait]
pub trait ItemWriter<T>: Send + Sync {
    async fn write(&self, items: &[T]) -> Result<(), StepExecutionError>;
}

/// Processor used when a chunk step has none configured
pub struct PassThroughItemProcessor<T>(PhantomData<fn(T) -> T>);

impl<T> Default for PassThroughItemProcessor<T> {
    fn default() -> Self {
        Self(PhantomData)
    }
}

#[async_trait]
impl<T: Send + 'static> ItemProcessor<T, T> for PassThroughItemProcessor<T> {
    async fn process(&self, item: T) -> Result<Option<T>, StepExecutionError> {
        Ok(Some(item))
    }
}

/// Writer decorator that retries a failed chunk write according to a strategy.
/// Only the failing chunk is re-sent, so the inner writer must tolerate replays.
pub struct RetryingItemWriter<T> {
    inner: Arc<dyn ItemWriter<T>>,
    strategy: Arc<dyn RetryStrategy>,
}

impl<T> RetryingItemWriter<T> {
    pub fn new(inner: Arc<dyn ItemWriter<T>>, strategy: Arc<dyn RetryStrategy>) -> Self {
        Self { inner, strategy }
    }
}

#[async_trait]
impl<T: Send + Sync> ItemWriter<T> for RetryingItemWriter<T> {
    async fn write(&self, items: &[T]) -> Result<(), StepExecutionError> {
        let mut attempt = 0;
        loop {
            match self.inner.write(items).await {
                Ok(()) => return Ok(()),
                Err(e) => match self.strategy.next_delay(attempt) {
                    Some(delay) => {
                        warn!(error = %e, attempt = attempt + 1, delay_ms = delay.as_millis() as u64, "Chunk write failed, retrying");
                        tokio::time::sleep(delay).await;
                        attempt += 1;
                    }
                    None => return Err(e),
                },
            }
        }
    }
}

/// Type-erased chunk loop so `Step` does not carry item types
#[async_trait]
trait ChunkLoop: Send + Sync {
    async fn run(
        &self,
        context: &StepContext,
        chunk_size: usize,
        stats: &mut StepExecution,
    ) -> Result<(), StepExecutionError>;
}

struct Pipeline<I, O> {
    reader: Arc<dyn ItemReaderFactory<I>>,
    processor: Arc<dyn ItemProcessor<I, O>>,
    writer: Arc<dyn ItemWriter<O>>,
}

#[async_trait]
impl<I, O> ChunkLoop for Pipeline<I, O>
where
    I: Send + 'static,
    O: Send + Sync + 'static,
{
    async fn run(
        &self,
        context: &StepContext,
        chunk_size: usize,
        stats: &mut StepExecution,
    ) -> Result<(), StepExecutionError> {
        let mut reader = self.reader.open(context).await?;

        loop {
            let mut items = Vec::with_capacity(chunk_size);
            let mut exhausted = false;
            while items.len() < chunk_size {
                match reader.read().await? {
                    Some(item) => {
                        stats.read_count += 1;
                        items.push(item);
                    }
                    None => {
                        exhausted = true;
                        break;
                    }
                }
            }

            if items.is_empty() {
                break;
            }

            let mut outputs = Vec::with_capacity(items.len());
            for item in items {
                match self.processor.process(item).await? {
                    Some(output) => outputs.push(output),
                    None => stats.filter_count += 1,
                }
            }

            if !outputs.is_empty() {
                self.writer.write(&outputs).await?;
                stats.write_count += outputs.len() as u64;
            }
            stats.commit_count += 1;

            debug!(
                step_name = %context.step_name,
                commit = stats.commit_count,
                written = outputs.len(),
                "Chunk committed"
            );

            if exhausted {
                break;
            }
        }

        Ok(())
    }
}

pub struct ChunkStep {
    name: String,
    chunk_size: NonZeroUsize,
    pipeline: Arc<dyn ChunkLoop>,
}

impl ChunkStep {
    /// Chunk step without a processor; items go from reader to writer unchanged
    pub fn new<T>(
        name: impl Into<String>,
        chunk_size: usize,
        reader: Arc<dyn ItemReaderFactory<T>>,
        writer: Arc<dyn ItemWriter<T>>,
    ) -> Result<Self, JobDefinitionError>
    where
        T: Send + Sync + 'static,
    {
        let processor: Arc<dyn ItemProcessor<T, T>> = Arc::new(PassThroughItemProcessor::default());
        Self::with_processor(name, chunk_size, reader, processor, writer)
    }

    pub fn with_processor<I, O>(
        name: impl Into<String>,
        chunk_size: usize,
        reader: Arc<dyn ItemReaderFactory<I>>,
        processor: Arc<dyn ItemProcessor<I, O>>,
        writer: Arc<dyn ItemWriter<O>>,
    ) -> Result<Self, JobDefinitionError>
    where
        I: Send + 'static,
        O: Send + Sync + 'static,
    {
        let name = name.into();
        ensure_name(&name)?;
        let chunk_size = NonZeroUsize::new(chunk_size)
            .ok_or_else(|| JobDefinitionError::InvalidChunkSize { step: name.clone() })?;

        Ok(Self {
            name,
            chunk_size,
            pipeline: Arc::new(Pipeline {
                reader,
                processor,
                writer,
            }),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size.get()
    }

    pub async fn run(
        &self,
        context: &StepContext,
        stats: &mut StepExecution,
    ) -> Result<(), StepExecutionError> {
        self.pipeline
            .run(context, self.chunk_size.get(), stats)
            .await
    }
}
