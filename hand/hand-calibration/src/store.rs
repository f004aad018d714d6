//! JSON calibration file with replace-on-success writes.

use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::error::{CalibrationError, Result};
use crate::record::{CalibrationRecord, CalibrationSnapshot};

/// Environment variable overriding the calibration file location.
pub const CALIBRATION_PATH_ENV: &str = "HAND_CALIBRATION_PATH";

/// Calibration file location when nothing else is configured.
pub const DEFAULT_CALIBRATION_PATH: &str = "data/calibration/hand_calibration.json";

/// Durable home of the [`CalibrationRecord`].
///
/// Writes go to a temporary file in the same directory which is fsynced and
/// then renamed over the target, so readers only ever see a whole record
/// and a failed write leaves the previous file untouched.
#[derive(Debug, Clone)]
pub struct CalibrationStore {
    path: PathBuf,
}

impl CalibrationStore {
    /// Store backed by `path`.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Store at `$HAND_CALIBRATION_PATH`, or the default location.
    #[must_use]
    pub fn from_env() -> Self {
        let path = std::env::var_os(CALIBRATION_PATH_ENV)
            .map_or_else(|| PathBuf::from(DEFAULT_CALIBRATION_PATH), PathBuf::from);
        Self::new(path)
    }

    /// File location.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads and validates the record.
    ///
    /// A missing file is not an error: it yields an empty, uninitialized
    /// record.
    ///
    /// # Errors
    ///
    /// Returns [`CalibrationError::Io`] if the file cannot be read,
    /// [`CalibrationError::Json`] if it does not parse, or the first
    /// validation failure.
    pub fn load(&self) -> Result<CalibrationRecord> {
        let bytes = match fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == ErrorKind::NotFound => {
                info!(path = %self.path.display(), "no calibration file, starting uninitialized");
                return Ok(CalibrationRecord::new());
            }
            Err(err) => return Err(CalibrationError::io(&self.path, err)),
        };
        let record: CalibrationRecord = serde_json::from_slice(&bytes)?;
        record.validate()?;
        debug!(
            path = %self.path.display(),
            revision = record.revision(),
            stage = %record.stage(),
            "loaded calibration"
        );
        Ok(record)
    }

    /// Loads the record and freezes it.
    ///
    /// # Errors
    ///
    /// Same as [`load`](Self::load).
    pub fn snapshot(&self) -> Result<CalibrationSnapshot> {
        self.load().map(CalibrationRecord::snapshot)
    }

    /// Validates and atomically replaces the stored record.
    ///
    /// # Errors
    ///
    /// Returns the validation failure, or [`CalibrationError::Io`] if any
    /// step of the write fails. In every error case the previous file is
    /// left as it was.
    pub fn save(&self, record: &CalibrationRecord) -> Result<()> {
        record.validate()?;
        let mut bytes = serde_json::to_vec_pretty(record)?;
        bytes.push(b'\n');

        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        fs::create_dir_all(dir).map_err(|e| CalibrationError::io(dir, e))?;

        let mut temp =
            tempfile::NamedTempFile::new_in(dir).map_err(|e| CalibrationError::io(dir, e))?;
        temp.as_file_mut()
            .write_all(&bytes)
            .map_err(|e| CalibrationError::io(temp.path(), e))?;
        temp.as_file()
            .sync_all()
            .map_err(|e| CalibrationError::io(temp.path(), e))?;
        temp.persist(&self.path)
            .map_err(|e| CalibrationError::io(&self.path, e.error))?;

        info!(
            path = %self.path.display(),
            revision = record.revision(),
            stage = %record.stage(),
            "calibration saved"
        );
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use hand_types::JointId;

    use super::*;
    use crate::range::{ActuatorRange, JointCalibration};
    use crate::record::AcquisitionStage;

    #[test]
    fn missing_file_loads_empty_record() {
        let dir = tempfile::tempdir().unwrap();
        let store = CalibrationStore::new(dir.path().join("absent.json"));
        let record = store.load().unwrap();
        assert_eq!(record.stage(), AcquisitionStage::Uninitialized);
        assert_eq!(record.revision(), 0);
    }

    #[test]
    fn save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let store = CalibrationStore::new(dir.path().join("nested/hand.json"));
        let record = CalibrationRecord::new()
            .with_range(JointId::MiddlePip.actuator(), ActuatorRange::new(500, 2500).unwrap())
            .with_joint(JointId::MiddlePip, JointCalibration::new(2200, 800).unwrap())
            .unwrap();
        store.save(&record).unwrap();
        assert_eq!(store.load().unwrap(), record);
    }

    #[test]
    fn corrupt_file_is_an_error_not_a_reset() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hand.json");
        fs::write(&path, b"{ not json").unwrap();
        let store = CalibrationStore::new(&path);
        assert!(matches!(store.load(), Err(CalibrationError::Json(_))));
        assert_eq!(fs::read(&path).unwrap(), b"{ not json");
    }

    #[test]
    fn garbage_range_in_file_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hand.json");
        fs::write(
            &path,
            r#"{"schema_version":1,"revision":3,"stage":"range_calibrated",
               "ranges":{"0":{"min_pulse_us":3000,"max_pulse_us":100}}}"#,
        )
        .unwrap();
        assert!(CalibrationStore::new(&path).load().is_err());
    }

    #[test]
    fn invalid_record_not_written() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hand.json");
        let store = CalibrationStore::new(&path);
        let good = CalibrationRecord::new()
            .with_range(JointId::PinkyMcp.actuator(), ActuatorRange::new(500, 2500).unwrap());
        store.save(&good).unwrap();
        let before = fs::read(&path).unwrap();

        let bad_json = serde_json::to_string(&good)
            .unwrap()
            .replace("\"schema_version\":1", "\"schema_version\":99");
        let bad: CalibrationRecord = serde_json::from_str(&bad_json).unwrap();
        assert!(store.save(&bad).is_err());
        assert_eq!(fs::read(&path).unwrap(), before);
    }
}
