use crate::config::{self, WriteItemsConfig};
use crate::error::{FailureClass, ModuleError, Result};
use crate::host::ErrorSeverity;
use crate::item::Batch;
use crate::stage::{Disposition, Stage, StageContext};
use std::fs::OpenOptions;
use std::io::{self, BufWriter, Write};
use std::path::Path;

/// Sink that appends the sample info of every delivered item to a file, one
/// line per item.
#[derive(Debug, Clone)]
pub struct WriteItemsToFile {
    config: WriteItemsConfig,
}

impl WriteItemsToFile {
    pub fn new(config: WriteItemsConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn from_config(document: &str) -> Result<Self> {
        Self::new(config::parse(document)?)
    }

    pub fn file_name(&self) -> &Path {
        &self.config.file_name
    }

    fn append(&self, lines: &[String]) -> io::Result<()> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.config.file_name)?;
        let mut writer = BufWriter::new(file);
        for line in lines {
            writeln!(writer, "{}", line)?;
        }
        writer.flush()
    }
}

impl Stage for WriteItemsToFile {
    fn handle(&self, batch: Batch, cx: &StageContext<'_>) -> Result<Disposition> {
        let Some(lines) = cx.collect(&batch, |item| item.sample_info().map(str::to_owned)) else {
            return Ok(Disposition::Discard);
        };
        if lines.is_empty() {
            return Ok(Disposition::Discard);
        }

        match self.append(&lines) {
            Ok(()) => Ok(Disposition::Complete(None)),
            Err(err) => match FailureClass::of_io(&err, false) {
                FailureClass::Fatal => {
                    let err = ModuleError::fatal(
                        format!("Cannot write to file {}", self.config.file_name.display()),
                        err,
                    );
                    cx.report(ErrorSeverity::FatalError, &err);
                    Ok(Disposition::Halt)
                }
                FailureClass::Transient => {
                    cx.report(ErrorSeverity::DataLoss, &ModuleError::Io(err));
                    Ok(Disposition::Complete(None))
                }
            },
        }
    }

    fn name(&self) -> &str {
        "write-items-to-file"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_append_writes_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("items.log");
        let sink = WriteItemsToFile::new(WriteItemsConfig {
            file_name: path.clone(),
        })
        .unwrap();
        sink.append(&["a".to_string(), "b".to_string()]).unwrap();
        sink.append(&["c".to_string()]).unwrap();
        assert_eq!(std::fs::read_to_string(path).unwrap(), "a\nb\nc\n");
    }

    #[test]
    fn test_from_config() {
        let sink = WriteItemsToFile::from_config(r#"file_name = "/tmp/items.log""#).unwrap();
        assert_eq!(sink.file_name(), Path::new("/tmp/items.log"));
    }
}
