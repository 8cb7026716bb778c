//! Local file acceptance checks, run before any network call.

use huddle_shared::protocol::FileTransferSetting;
use huddle_shared::types::OutgoingFile;
use huddle_shared::ValidationError;

/// Reject a file the host's transfer settings do not allow.
pub fn validate_file(
    file: &OutgoingFile,
    enabled: bool,
    setting: &FileTransferSetting,
) -> Result<(), ValidationError> {
    if !enabled {
        return Err(ValidationError::FileTransferDisabled);
    }
    if file.size > setting.size_limit {
        return Err(ValidationError::FileTooLarge {
            size: file.size,
            max: setting.size_limit,
        });
    }
    if let Some(allowed) = setting.allowed_extensions() {
        let extension = file.extension().unwrap_or_default();
        if !allowed.iter().any(|ext| *ext == extension) {
            return Err(ValidationError::FileTypeNotAllowed { extension });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn file(name: &str, size: u64) -> OutgoingFile {
        OutgoingFile {
            name: name.to_string(),
            size,
            mime_type: String::new(),
        }
    }

    fn setting(size_limit: u64, type_limit: &str) -> FileTransferSetting {
        FileTransferSetting {
            size_limit,
            type_limit: type_limit.to_string(),
        }
    }

    #[test]
    fn test_accepts_within_limits() {
        assert!(validate_file(&file("a.png", 10), true, &setting(10, "*")).is_ok());
        assert!(validate_file(&file("a.PNG", 10), true, &setting(10, "png,jpg")).is_ok());
    }

    #[test]
    fn test_rejects_oversized() {
        assert_eq!(
            validate_file(&file("a.png", 11), true, &setting(10, "*")),
            Err(ValidationError::FileTooLarge { size: 11, max: 10 })
        );
    }

    #[test]
    fn test_rejects_disallowed_type() {
        assert_eq!(
            validate_file(&file("run.exe", 1), true, &setting(10, ".png,.jpg")),
            Err(ValidationError::FileTypeNotAllowed {
                extension: "exe".into()
            })
        );
        assert_eq!(
            validate_file(&file("Makefile", 1), true, &setting(10, "png")),
            Err(ValidationError::FileTypeNotAllowed {
                extension: String::new()
            })
        );
    }

    #[test]
    fn test_rejects_when_disabled() {
        assert_eq!(
            validate_file(&file("a.png", 1), false, &setting(10, "*")),
            Err(ValidationError::FileTransferDisabled)
        );
    }
}
