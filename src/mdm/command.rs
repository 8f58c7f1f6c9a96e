//! Commands and command result reports.

use super::plist_util::{dict, optional_string, parse_plist, required_string};
use crate::core::error::{StoreError, StoreResult};

/// Status a device sends when it has nothing to report.
pub const STATUS_IDLE: &str = "Idle";
/// Status a device sends to defer a command.
pub const STATUS_NOT_NOW: &str = "NotNow";

/// A server-to-device command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    pub command_uuid: String,
    pub request_type: String,
    /// The command plist, verbatim.
    pub raw: Vec<u8>,
}

impl Command {
    /// Decode a command plist, reading `CommandUUID` and
    /// `Command.RequestType`.
    pub fn decode(raw: &[u8]) -> StoreResult<Self> {
        let value = parse_plist(raw)?;
        let fields = dict(&value, "command")?;
        let command_uuid = required_string(fields, "CommandUUID")?;
        if command_uuid.is_empty() {
            return Err(StoreError::invalid_input("empty CommandUUID"));
        }
        let body = fields
            .get("Command")
            .ok_or_else(|| StoreError::invalid_input("missing Command dictionary"))?;
        let request_type = required_string(dict(body, "Command")?, "RequestType")?;
        Ok(Self {
            command_uuid,
            request_type,
            raw: raw.to_vec(),
        })
    }
}

/// A device's report on a command (or `Idle`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandResults {
    /// Empty for `Idle` reports.
    pub command_uuid: String,
    pub status: String,
    pub raw: Vec<u8>,
}

impl CommandResults {
    pub fn is_idle(&self) -> bool {
        self.status == STATUS_IDLE
    }
}

/// Decode a command result report.
pub fn decode_results(raw: &[u8]) -> StoreResult<CommandResults> {
    let value = parse_plist(raw)?;
    let fields = dict(&value, "command results")?;
    let status = required_string(fields, "Status")?;
    let command_uuid = optional_string(fields, "CommandUUID").unwrap_or_default();
    if command_uuid.is_empty() && status != STATUS_IDLE {
        return Err(StoreError::invalid_input(format!(
            "{status} report without CommandUUID"
        )));
    }
    Ok(CommandResults {
        command_uuid,
        status,
        raw: raw.to_vec(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_reads_uuid_and_request_type() {
        let raw = br#"<plist version="1.0"><dict>
            <key>CommandUUID</key><string>c1</string>
            <key>Command</key><dict>
                <key>RequestType</key><string>DeviceInformation</string>
            </dict>
        </dict></plist>"#;
        let cmd = Command::decode(raw).unwrap();
        assert_eq!(cmd.command_uuid, "c1");
        assert_eq!(cmd.request_type, "DeviceInformation");
        assert_eq!(cmd.raw, raw.to_vec());
    }

    #[test]
    fn command_without_request_type_is_rejected() {
        let raw = br#"<plist version="1.0"><dict>
            <key>CommandUUID</key><string>c1</string>
            <key>Command</key><dict/>
        </dict></plist>"#;
        assert!(Command::decode(raw).is_err());
    }

    #[test]
    fn idle_report_needs_no_uuid() {
        let raw = br#"<plist version="1.0"><dict>
            <key>Status</key><string>Idle</string>
        </dict></plist>"#;
        let report = decode_results(raw).unwrap();
        assert!(report.is_idle());
        assert!(report.command_uuid.is_empty());
    }

    #[test]
    fn non_idle_report_needs_uuid() {
        let raw = br#"<plist version="1.0"><dict>
            <key>Status</key><string>Acknowledged</string>
        </dict></plist>"#;
        assert!(decode_results(raw).is_err());
    }
}
