//! Platform identity generation.
//!
//! Serial number, board serial (MLB) and system UUID come from an external
//! serial utility (macserial). When the utility is absent or its output
//! cannot be parsed, a sentinel identity is returned instead; the two
//! sentinels are distinct so a reader of the generated config can tell which
//! case occurred. The 6-byte ROM identifier is always freshly random.

use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::error::UtilityError;
use crate::process::Cmd;

/// Default utility name looked up on `PATH`.
pub const SERIAL_TOOL: &str = "macserial";

/// Identity used when the utility is not installed.
pub const MISSING_SENTINEL: SentinelTriple = SentinelTriple {
    serial_number: "UTILITY-MISSING",
    board_serial: "UTILITY-MISSING-MLB",
    system_uuid: "00000000-0000-0000-0000-000000000000",
};

/// Identity used when the utility ran but its output was unusable.
pub const ERROR_SENTINEL: SentinelTriple = SentinelTriple {
    serial_number: "UTILITY-ERROR",
    board_serial: "UTILITY-ERROR-MLB",
    system_uuid: "FFFFFFFF-FFFF-FFFF-FFFF-FFFFFFFFFFFF",
};

/// Label prefixes stripped from output fields, longest first.
const LABELS: &[&str] = &[
    "board serial:",
    "serial number:",
    "system uuid:",
    "serial:",
    "smuuid:",
    "uuid:",
    "mlb:",
];

#[derive(Debug, Clone, Copy)]
pub struct SentinelTriple {
    pub serial_number: &'static str,
    pub board_serial: &'static str,
    pub system_uuid: &'static str,
}

/// Where an identity came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdentitySource {
    Generated,
    UtilityMissing,
    UtilityError,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlatformIdentity {
    pub serial_number: String,
    pub board_serial: String,
    pub system_uuid: String,
    pub rom: [u8; 6],
    pub source: IdentitySource,
}

impl PlatformIdentity {
    fn from_sentinel(triple: SentinelTriple, source: IdentitySource) -> Self {
        Self {
            serial_number: triple.serial_number.to_string(),
            board_serial: triple.board_serial.to_string(),
            system_uuid: triple.system_uuid.to_string(),
            rom: random_rom(),
            source,
        }
    }

    /// True for either fallback identity.
    pub fn is_sentinel(&self) -> bool {
        self.source != IdentitySource::Generated
    }
}

/// The narrow seam around the external utility.
pub trait SerialUtility {
    /// Stdout of one invocation for the given SMBIOS model.
    fn query(&self, model: &str) -> Result<String, UtilityError>;
}

/// The real utility binary at a fixed path.
#[derive(Debug, Clone)]
pub struct Macserial {
    path: PathBuf,
}

impl Macserial {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl SerialUtility for Macserial {
    fn query(&self, model: &str) -> Result<String, UtilityError> {
        if !self.path.is_file() {
            return Err(UtilityError::Missing {
                tool: SERIAL_TOOL.to_string(),
                path: self.path.clone(),
            });
        }

        Cmd::from_path(&self.path)
            .args(["--num", "1", "--model", model])
            .error_msg(format!("{} failed for model {}", SERIAL_TOOL, model))
            .run()
            .map(|result| result.stdout)
            .map_err(|e| UtilityError::Failed {
                tool: SERIAL_TOOL.to_string(),
                reason: format!("{:#}", e),
            })
    }
}

/// Generate an identity using the utility binary at `utility_path`.
pub fn generate(model: &str, utility_path: &Path) -> PlatformIdentity {
    generate_with(model, &Macserial::new(utility_path))
}

/// Generate an identity through any [`SerialUtility`].
pub fn generate_with(model: &str, utility: &dyn SerialUtility) -> PlatformIdentity {
    let output = match utility.query(model) {
        Ok(output) => output,
        Err(e @ UtilityError::Missing { .. }) => {
            warn!("{}; using placeholder identity", e);
            return PlatformIdentity::from_sentinel(MISSING_SENTINEL, IdentitySource::UtilityMissing);
        }
        Err(e) => {
            warn!("{}; using error identity", e);
            return PlatformIdentity::from_sentinel(ERROR_SENTINEL, IdentitySource::UtilityError);
        }
    };

    match parse_output(&output) {
        Ok((serial_number, board_serial, system_uuid)) => {
            info!(model, serial = %serial_number, "generated platform identity");
            PlatformIdentity {
                serial_number,
                board_serial,
                system_uuid,
                rom: random_rom(),
                source: IdentitySource::Generated,
            }
        }
        Err(e) => {
            warn!("{}; using error identity", e);
            PlatformIdentity::from_sentinel(ERROR_SENTINEL, IdentitySource::UtilityError)
        }
    }
}

/// Parse `Serial: X | Board Serial: Y | SmUUID: Z` into its three values.
///
/// Exactly one non-empty line with exactly three fields is accepted; labels
/// are optional and matched case-insensitively. The UUID is normalised to
/// upper-case hyphenated form.
pub fn parse_output(stdout: &str) -> Result<(String, String, String), UtilityError> {
    let unparsable = |reason: String| UtilityError::Unparsable {
        tool: SERIAL_TOOL.to_string(),
        reason,
    };

    let lines: Vec<&str> = stdout.lines().map(str::trim).filter(|l| !l.is_empty()).collect();
    let line = match lines.as_slice() {
        [line] => *line,
        [] => return Err(unparsable("no output".to_string())),
        more => return Err(unparsable(format!("expected one line, got {}", more.len()))),
    };

    let fields: Vec<String> = line.split('|').map(strip_label).collect();
    let [serial, board, uuid] = match <[String; 3]>::try_from(fields) {
        Ok(fields) => fields,
        Err(fields) => {
            return Err(unparsable(format!("expected 3 fields, got {}", fields.len())));
        }
    };

    if serial.is_empty() || board.is_empty() || uuid.is_empty() {
        return Err(unparsable(format!("blank field in '{}'", line)));
    }

    let uuid = uuid::Uuid::parse_str(&uuid)
        .map_err(|e| unparsable(format!("invalid system UUID '{}': {}", uuid, e)))?
        .hyphenated()
        .to_string()
        .to_uppercase();

    Ok((serial, board, uuid))
}

fn strip_label(field: &str) -> String {
    let field = field.trim();
    let lower = field.to_ascii_lowercase();
    for label in LABELS {
        if lower.starts_with(label) {
            return field[label.len()..].trim().to_string();
        }
    }
    field.to_string()
}

fn random_rom() -> [u8; 6] {
    rand::random()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    struct FakeUtility {
        response: Result<String, UtilityError>,
        calls: Cell<usize>,
    }

    impl FakeUtility {
        fn returning(output: &str) -> Self {
            Self {
                response: Ok(output.to_string()),
                calls: Cell::new(0),
            }
        }

        fn failing(err: UtilityError) -> Self {
            Self {
                response: Err(err),
                calls: Cell::new(0),
            }
        }
    }

    impl SerialUtility for FakeUtility {
        fn query(&self, _model: &str) -> Result<String, UtilityError> {
            self.calls.set(self.calls.get() + 1);
            self.response.clone()
        }
    }

    const GOOD: &str =
        "Serial: C02ZX0AAJV3Q | Board Serial: C02925200GUJG36CB | SmUUID: 0f5e6b2a-4d1c-4b8e-9a7f-3c2d1e0f9a8b\n";

    #[test]
    fn test_parses_labelled_fields() {
        let (serial, board, uuid) = parse_output(GOOD).unwrap();
        assert_eq!(serial, "C02ZX0AAJV3Q");
        assert_eq!(board, "C02925200GUJG36CB");
        assert_eq!(uuid, "0F5E6B2A-4D1C-4B8E-9A7F-3C2D1E0F9A8B");
    }

    #[test]
    fn test_unlabelled_fields_are_accepted() {
        let (serial, _, _) =
            parse_output("C02ZX0AAJV3Q | C02925200GUJG36CB | 0F5E6B2A-4D1C-4B8E-9A7F-3C2D1E0F9A8B").unwrap();
        assert_eq!(serial, "C02ZX0AAJV3Q");
    }

    #[test]
    fn test_blank_field_after_trimming_fails() {
        let err = parse_output("Serial: C02ZX0AAJV3Q | Board Serial:   | SmUUID: 0F5E6B2A-4D1C-4B8E-9A7F-3C2D1E0F9A8B")
            .unwrap_err();
        assert!(matches!(err, UtilityError::Unparsable { .. }));
    }

    #[test]
    fn test_wrong_field_count_fails() {
        assert!(parse_output("a | b").is_err());
        assert!(parse_output("a | b | c | d").is_err());
    }

    #[test]
    fn test_multiple_lines_fail() {
        assert!(parse_output(&format!("{}{}", GOOD, GOOD)).is_err());
    }

    #[test]
    fn test_invalid_uuid_fails() {
        assert!(parse_output("Serial: A | Board Serial: B | SmUUID: not-a-uuid").is_err());
    }

    #[test]
    fn test_generated_identity() {
        let utility = FakeUtility::returning(GOOD);
        let identity = generate_with("iMac20,2", &utility);
        assert_eq!(identity.source, IdentitySource::Generated);
        assert_eq!(identity.serial_number, "C02ZX0AAJV3Q");
        assert!(!identity.is_sentinel());
        assert_eq!(utility.calls.get(), 1);
    }

    #[test]
    fn test_missing_and_error_sentinels_are_distinct() {
        let missing = generate_with(
            "iMac20,2",
            &FakeUtility::failing(UtilityError::Missing {
                tool: SERIAL_TOOL.to_string(),
                path: PathBuf::from("/nope"),
            }),
        );
        let broken = generate_with("iMac20,2", &FakeUtility::returning("garbage"));

        assert_eq!(missing.source, IdentitySource::UtilityMissing);
        assert_eq!(broken.source, IdentitySource::UtilityError);
        assert_ne!(missing.serial_number, broken.serial_number);
        assert_ne!(missing.board_serial, broken.board_serial);
        assert_ne!(missing.system_uuid, broken.system_uuid);
    }

    #[test]
    fn test_failed_run_uses_error_sentinel() {
        let identity = generate_with(
            "iMac20,2",
            &FakeUtility::failing(UtilityError::Failed {
                tool: SERIAL_TOOL.to_string(),
                reason: "exit code 1".to_string(),
            }),
        );
        assert_eq!(identity.serial_number, ERROR_SENTINEL.serial_number);
    }

    #[test]
    fn test_rom_is_fresh_every_time() {
        let utility = FakeUtility::returning(GOOD);
        let roms: Vec<[u8; 6]> = (0..4).map(|_| generate_with("iMac20,2", &utility).rom).collect();
        assert!(roms.windows(2).any(|w| w[0] != w[1]));
    }

    #[test]
    fn test_missing_binary_path() {
        let identity = generate("iMac20,2", Path::new("/nonexistent/macserial"));
        assert_eq!(identity.source, IdentitySource::UtilityMissing);
        assert_eq!(identity.serial_number, MISSING_SENTINEL.serial_number);
    }

    #[cfg(unix)]
    #[test]
    fn test_real_invocation_of_script() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("macserial");
        std::fs::write(
            &script,
            "#!/bin/sh\necho 'Serial: C02ZX0AAJV3Q | Board Serial: C02925200GUJG36CB | SmUUID: 0F5E6B2A-4D1C-4B8E-9A7F-3C2D1E0F9A8B'\n",
        )
        .unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();

        let identity = generate("iMac20,2", &script);
        assert_eq!(identity.source, IdentitySource::Generated);
        assert_eq!(identity.board_serial, "C02925200GUJG36CB");
    }
}
