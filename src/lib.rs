mod embed;
mod error;
mod font;
mod merge;
mod names;
mod perf;
mod stamp;
mod template;
#[cfg(test)]
mod test_support;
mod types;

pub use error::{ErrorKind, LabelError};
pub use font::{FontProgramKind, FontResource, GlyphRun, ShapedGlyph};
pub use merge::{DEFAULT_PDF_VERSION, DEFAULT_PRODUCER, DocumentMerger, MergeOptions};
pub use names::{EmptyEntryPolicy, NameList};
use perf::PerfLogger;
pub use stamp::{
    LABEL_FONT_SIZE, LABEL_RIGHT_MARGIN, LABEL_TOP_OFFSET, LabelPlacement, PageStamper,
    label_origin,
};
pub use template::{TemplateDocument, WorkingCopy};
pub use types::{Color, PageBox, Pt, Size};

use std::path::{Path, PathBuf};
use std::time::Instant;

pub const DEFAULT_PARALLEL_BATCH_SIZE: usize = 32;

/// Reported after each recipient's pages have been appended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Progress {
    pub completed: usize,
    pub total: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSummary {
    pub recipients: usize,
    pub pages_per_recipient: usize,
    pub pages_written: usize,
    /// Hex SHA-256 of the template bytes.
    pub template_fingerprint: String,
    pub elapsed_ms: u64,
}

#[derive(Debug, Clone)]
pub struct LabelOutput {
    pub bytes: Vec<u8>,
    pub summary: RunSummary,
}

/// Produces one labeled copy of a template per recipient and merges them
/// into a single PDF, recipients in list order.
pub struct Labeler {
    empty_entry_policy: EmptyEntryPolicy,
    parallel: bool,
    parallel_batch_size: usize,
    merge_options: MergeOptions,
    perf: Option<PerfLogger>,
}

pub struct LabelerBuilder {
    empty_entry_policy: EmptyEntryPolicy,
    parallel: bool,
    parallel_batch_size: usize,
    compress: bool,
    pdf_version: String,
    producer: Option<String>,
    perf_path: Option<PathBuf>,
}

impl Labeler {
    pub fn new() -> Self {
        Self {
            empty_entry_policy: EmptyEntryPolicy::default(),
            parallel: false,
            parallel_batch_size: DEFAULT_PARALLEL_BATCH_SIZE,
            merge_options: MergeOptions::default(),
            perf: None,
        }
    }

    pub fn builder() -> LabelerBuilder {
        LabelerBuilder::new()
    }

    pub fn empty_entry_policy(&self) -> EmptyEntryPolicy {
        self.empty_entry_policy
    }

    pub fn run(
        &self,
        template: &[u8],
        font: &[u8],
        names: &str,
    ) -> Result<LabelOutput, LabelError> {
        self.run_with_progress(template, font, names, |_| {})
    }

    /// Parses all three inputs, then labels. Input problems surface before
    /// any recipient is processed.
    pub fn run_with_progress<F>(
        &self,
        template: &[u8],
        font: &[u8],
        names: &str,
        on_progress: F,
    ) -> Result<LabelOutput, LabelError>
    where
        F: FnMut(Progress),
    {
        let perf = self.perf.as_ref();

        let timer = perf::span(perf, "template.parse", None);
        let template = TemplateDocument::parse(template)?;
        timer.finish();

        let timer = perf::span(perf, "font.load", None);
        let font = FontResource::load(font)?;
        timer.finish();

        let names = NameList::parse(names, self.empty_entry_policy);
        self.label(&template, &font, &names, on_progress)
    }

    /// Reads the three inputs from disk, labels, and writes `output`.
    pub fn run_files(
        &self,
        template: impl AsRef<Path>,
        names: impl AsRef<Path>,
        font: impl AsRef<Path>,
        output: impl AsRef<Path>,
    ) -> Result<RunSummary, LabelError> {
        let template_bytes = std::fs::read(template.as_ref())?;
        let names_text = std::fs::read_to_string(names.as_ref())?;
        let font_bytes = std::fs::read(font.as_ref())?;
        let result = self.run(&template_bytes, &font_bytes, &names_text)?;
        std::fs::write(output.as_ref(), &result.bytes)?;
        log::info!("wrote {}", output.as_ref().display());
        Ok(result.summary)
    }

    /// The per-recipient loop over already parsed inputs. Fails on the first
    /// error; nothing is produced for a failed run.
    pub fn label<F>(
        &self,
        template: &TemplateDocument,
        font: &FontResource,
        names: &NameList,
        mut on_progress: F,
    ) -> Result<LabelOutput, LabelError>
    where
        F: FnMut(Progress),
    {
        let started = Instant::now();
        let perf = self.perf.as_ref();
        let total = names.len();
        let page_indices: Vec<usize> = (0..template.page_count()).collect();

        log::info!(
            "labeling {} recipients x {} pages (template {}, font {})",
            total,
            page_indices.len(),
            template.fingerprint(),
            font.name()
        );
        if total == 0 {
            log::warn!("name list is empty; the output will have no pages");
        }
        if let Some(logger) = perf {
            logger.log_run_start(template.fingerprint(), total, page_indices.len());
        }

        let stamper = PageStamper::new(font);
        let mut merger = DocumentMerger::with_options(self.merge_options.clone());
        let mut append = |merger: &mut DocumentMerger, index: usize, copy: WorkingCopy| {
            let timer = perf::span(perf, "recipient.append", Some(index));
            merger
                .append_pages(&copy, &page_indices)
                .map_err(|err| err.with_recipient(index))?;
            timer.finish();
            log::debug!("appended recipient {} of {}", index + 1, total);
            on_progress(Progress {
                completed: index + 1,
                total,
            });
            Ok::<(), LabelError>(())
        };

        if self.parallel {
            use rayon::prelude::*;

            let batch_size = self.parallel_batch_size.max(1);
            for (batch_index, batch) in names.entries().chunks(batch_size).enumerate() {
                let base = batch_index * batch_size;
                let mut results: Vec<(usize, Result<WorkingCopy, LabelError>)> = batch
                    .par_iter()
                    .enumerate()
                    .map(|(offset, name)| {
                        let index = base + offset;
                        (index, stamp_recipient(template, &stamper, index, name, perf))
                    })
                    .collect();
                // rayon completes out of order; append in list order.
                results.sort_by_key(|(index, _)| *index);
                for (index, result) in results {
                    append(&mut merger, index, result?)?;
                }
            }
        } else {
            for (index, name) in names.iter().enumerate() {
                let copy = stamp_recipient(template, &stamper, index, name, perf)?;
                append(&mut merger, index, copy)?;
            }
        }

        let pages_written = merger.page_count();
        let timer = perf::span(perf, "output.finalize", None);
        let bytes = merger.finalize()?;
        timer.finish();

        let summary = RunSummary {
            recipients: total,
            pages_per_recipient: page_indices.len(),
            pages_written,
            template_fingerprint: template.fingerprint().to_string(),
            elapsed_ms: started.elapsed().as_millis() as u64,
        };
        if let Some(logger) = perf {
            logger.log_counts(
                "output",
                None,
                &[
                    ("recipients", total as u64),
                    ("pages", pages_written as u64),
                    ("bytes", bytes.len() as u64),
                ],
            );
            logger.flush();
        }
        log::info!(
            "labeled {} recipients: {} pages, {} bytes in {} ms",
            summary.recipients,
            summary.pages_written,
            bytes.len(),
            summary.elapsed_ms
        );
        Ok(LabelOutput { bytes, summary })
    }
}

fn stamp_recipient(
    template: &TemplateDocument,
    stamper: &PageStamper<'_>,
    index: usize,
    name: &str,
    perf: Option<&PerfLogger>,
) -> Result<WorkingCopy, LabelError> {
    let timer = perf::span(perf, "recipient.clone", Some(index));
    let mut copy = template.clone_working_copy();
    timer.finish();

    let timer = perf::span(perf, "recipient.stamp", Some(index));
    let placements = stamper
        .stamp(&mut copy, name)
        .map_err(|err| err.with_recipient(index))?;
    timer.finish();

    if let Some(first) = placements.first() {
        log::debug!(
            "recipient {}: {:?} at x={} y={}",
            index + 1,
            name,
            first.x.to_pdf_number(),
            first.y.to_pdf_number()
        );
    }
    Ok(copy)
}

impl Default for Labeler {
    fn default() -> Self {
        Self::new()
    }
}

impl LabelerBuilder {
    pub fn new() -> Self {
        Self {
            empty_entry_policy: EmptyEntryPolicy::default(),
            parallel: false,
            parallel_batch_size: DEFAULT_PARALLEL_BATCH_SIZE,
            compress: true,
            pdf_version: DEFAULT_PDF_VERSION.to_string(),
            producer: Some(DEFAULT_PRODUCER.to_string()),
            perf_path: None,
        }
    }

    pub fn empty_entry_policy(mut self, policy: EmptyEntryPolicy) -> Self {
        self.empty_entry_policy = policy;
        self
    }

    /// Stamp recipients concurrently in batches; output order is unchanged.
    pub fn parallel(mut self, enabled: bool) -> Self {
        self.parallel = enabled;
        self
    }

    pub fn parallel_batch_size(mut self, size: usize) -> Self {
        self.parallel_batch_size = size;
        self
    }

    pub fn compress(mut self, enabled: bool) -> Self {
        self.compress = enabled;
        self
    }

    pub fn pdf_version(mut self, version: impl Into<String>) -> Self {
        self.pdf_version = version.into();
        self
    }

    pub fn producer(mut self, producer: Option<String>) -> Self {
        self.producer = producer;
        self
    }

    /// JSONL timing log; a `_hot` summary is written next to it.
    pub fn perf_log(mut self, path: impl Into<PathBuf>) -> Self {
        self.perf_path = Some(path.into());
        self
    }

    pub fn build(self) -> Result<Labeler, LabelError> {
        if self.parallel_batch_size == 0 {
            return Err(LabelError::InvalidConfiguration(
                "parallel_batch_size must be > 0".to_string(),
            ));
        }
        validate_pdf_version(&self.pdf_version)?;
        let perf = match self.perf_path {
            Some(path) => Some(PerfLogger::new(path)?),
            None => None,
        };
        Ok(Labeler {
            empty_entry_policy: self.empty_entry_policy,
            parallel: self.parallel,
            parallel_batch_size: self.parallel_batch_size,
            merge_options: MergeOptions {
                version: self.pdf_version,
                compress: self.compress,
                producer: self.producer,
            },
            perf,
        })
    }
}

impl Default for LabelerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

fn validate_pdf_version(version: &str) -> Result<(), LabelError> {
    let valid = match version.strip_prefix("1.") {
        Some(minor) => minor.len() == 1 && matches!(minor.as_bytes()[0], b'0'..=b'7'),
        None => false,
    };
    if valid {
        Ok(())
    } else {
        Err(LabelError::InvalidConfiguration(format!(
            "pdf_version must be 1.0 through 1.7, got {version:?}"
        )))
    }
}
