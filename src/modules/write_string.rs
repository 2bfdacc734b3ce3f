use crate::config::{self, WriteStringConfig};
use crate::error::{FailureClass, ModuleError, Result};
use crate::host::ErrorSeverity;
use crate::item::{Batch, DataItem};
use crate::stage::{Disposition, Stage, StageContext};
use std::fs::OpenOptions;
use std::io::{self, Write};
use std::path::Path;

/// Write action that appends a configured line to a file on every trigger and
/// reports the write as a sample item.
#[derive(Debug, Clone)]
pub struct WriteStringToFile {
    config: WriteStringConfig,
}

impl WriteStringToFile {
    pub fn new(config: WriteStringConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn from_config(document: &str) -> Result<Self> {
        Self::new(config::parse(document)?)
    }

    pub fn file_name(&self) -> &Path {
        &self.config.file_name
    }

    fn append(&self) -> io::Result<()> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.config.file_name)?;
        writeln!(file, "{}", self.config.string_input)?;
        file.flush()
    }
}

impl Stage for WriteStringToFile {
    // The delivered items only trigger the write.
    fn handle(&self, _batch: Batch, cx: &StageContext<'_>) -> Result<Disposition> {
        match self.append() {
            Ok(()) => Ok(Disposition::Notify(Batch::single(DataItem::sample(format!(
                "Wrote {} to file {} successfully",
                self.config.string_input,
                self.config.file_name.display()
            ))))),
            Err(err) => match FailureClass::of_io(&err, false) {
                FailureClass::Fatal => Err(ModuleError::fatal(
                    format!("Cannot write to file {}", self.config.file_name.display()),
                    err,
                )),
                FailureClass::Transient => {
                    cx.report(ErrorSeverity::Warning, &ModuleError::Io(err));
                    Ok(Disposition::Complete(None))
                }
            },
        }
    }

    fn name(&self) -> &str {
        "write-string-to-file"
    }
}
