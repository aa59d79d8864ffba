//! Printing readings.

use std::io::Write;
use std::sync::Mutex;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

use roroshetta_core::{DeviceIdentity, Publisher, Reading, Result};

/// How readings are printed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// One human-readable line per reading.
    #[default]
    Text,
    /// One JSON object per line.
    Json,
}

#[derive(Serialize)]
struct JsonLine<'a> {
    device: &'a DeviceIdentity,
    #[serde(with = "time::serde::rfc3339")]
    timestamp: OffsetDateTime,
    reading: &'a Reading,
}

/// Render one reading as a single line, without the trailing newline.
pub fn format_reading(
    format: OutputFormat,
    identity: &DeviceIdentity,
    reading: &Reading,
    at: OffsetDateTime,
) -> Result<String> {
    match format {
        OutputFormat::Text => {
            let timestamp = at
                .format(&Rfc3339)
                .map_err(|e| std::io::Error::other(e.to_string()))?;
            Ok(format!("{} {} {}", timestamp, identity, reading))
        }
        OutputFormat::Json => {
            let line = JsonLine {
                device: identity,
                timestamp: at,
                reading,
            };
            Ok(serde_json::to_string(&line).map_err(std::io::Error::from)?)
        }
    }
}

/// Writes each reading as a line to a writer (stdout by default).
pub struct LinePublisher<W = std::io::Stdout> {
    format: OutputFormat,
    writer: Mutex<W>,
}

impl LinePublisher {
    /// Print to stdout.
    pub fn stdout(format: OutputFormat) -> Self {
        Self::new(format, std::io::stdout())
    }
}

impl<W: Write + Send> LinePublisher<W> {
    /// Print to any writer.
    pub fn new(format: OutputFormat, writer: W) -> Self {
        Self {
            format,
            writer: Mutex::new(writer),
        }
    }

    /// Consume the publisher and return its writer.
    pub fn into_inner(self) -> W {
        self.writer
            .into_inner()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl<W: Write + Send> Publisher for LinePublisher<W> {
    async fn publish(&self, identity: &DeviceIdentity, reading: &Reading) -> Result<()> {
        let line = format_reading(self.format, identity, reading, OffsetDateTime::now_utc())?;
        let mut writer = self
            .writer
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        writeln!(writer, "{}", line)?;
        writer.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use roroshetta_core::mock::sample_reading;
    use time::macros::datetime;

    fn kitchen() -> DeviceIdentity {
        DeviceIdentity::new("C8:2B:96:10:20:30")
    }

    #[test]
    fn test_text_line() {
        let line = format_reading(
            OutputFormat::Text,
            &kitchen(),
            &sample_reading(),
            datetime!(2026-03-01 12:00 UTC),
        )
        .unwrap();
        assert!(line.starts_with("2026-03-01T12:00:00Z C8:2B:96:10:20:30 21.5°C 45.0%"));
    }

    #[test]
    fn test_json_line() {
        let line = format_reading(
            OutputFormat::Json,
            &kitchen(),
            &sample_reading(),
            datetime!(2026-03-01 12:00 UTC),
        )
        .unwrap();
        let value: serde_json::Value = serde_json::from_str(&line).unwrap();
        assert_eq!(value["device"]["address"], "C8:2B:96:10:20:30");
        assert_eq!(value["timestamp"], "2026-03-01T12:00:00Z");
        assert_eq!(value["reading"]["temperature"], 21.5);
        assert!(!line.contains('\n'));
    }

    #[tokio::test]
    async fn test_publisher_writes_lines() {
        let publisher = LinePublisher::new(OutputFormat::Json, Vec::new());
        publisher.publish(&kitchen(), &sample_reading()).await.unwrap();
        publisher.publish(&kitchen(), &sample_reading()).await.unwrap();

        let output = String::from_utf8(publisher.into_inner()).unwrap();
        assert_eq!(output.lines().count(), 2);
    }

    #[test]
    fn test_format_serde() {
        assert_eq!(serde_json::to_string(&OutputFormat::Json).unwrap(), "\"json\"");
        let format: OutputFormat = serde_json::from_str("\"text\"").unwrap();
        assert_eq!(format, OutputFormat::Text);
    }
}
