//! Environment information returned by the camera's `env` query.

use crate::envelope::Element;
use serde::{Deserialize, Serialize};

/// Device descriptor reported in the environment response.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceInfo {
    pub manufacturer: String,
    pub model_name: String,
    pub serial_number: String,
    /// Capability flags, as reported.
    pub additional_function: String,
    /// Advisory command timeout, as reported. Not enforced by the client.
    pub cmd_timeout: Option<u32>,
}

/// Camera environment, received once per connection.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvironmentInfo {
    pub version: String,
    /// UDP port the camera pushes telemetry from.
    pub udp_port: Option<u16>,
    pub device: DeviceInfo,
}

impl EnvironmentInfo {
    /// Builds environment info from a `<Response>` element.
    ///
    /// Returns `None` when the response carries no `<Version>`. Other fields
    /// are optional; unparsable numbers are treated as absent.
    pub fn from_response(response: &Element) -> Option<Self> {
        let version = response.child_text("Version")?.to_string();

        let udp_port = response
            .child("RTInfo")
            .and_then(|rt| rt.child_text("Port"))
            .and_then(|port| port.trim().parse().ok());

        let device = response
            .child("Device")
            .map(|device| {
                let text = |name: &str| device.child_text(name).unwrap_or_default().to_string();
                DeviceInfo {
                    manufacturer: text("Manufacturer"),
                    model_name: text("ModelName"),
                    serial_number: text("SerialNo."),
                    additional_function: text("AdditionalFunction"),
                    cmd_timeout: device
                        .child_text("CmdTimeout")
                        .and_then(|t| t.trim().parse().ok()),
                }
            })
            .unwrap_or_default();

        Some(Self {
            version,
            udp_port,
            device,
        })
    }
}

/// Registration name used when the model is not listed in [`REGISTRATION_NAMES`].
pub const DEFAULT_REGISTRATION_NAME: &str = "RC_P2Package_NodeJS";

/// Remote-control registration names by camera model.
pub const REGISTRATION_NAMES: &[(&str, &str)] = &[
    ("HC-X2", "RC_SemiProApp_NodeJS"),
    ("HC-X20", "RC_SemiProApp_NodeJS"),
    ("CX350", "RC_AllianceApp"),
    ("EVA1", "RC_AllianceApp"),
];

/// Returns the name the client registers under for the given camera model.
pub fn registration_name(model_name: &str) -> &'static str {
    REGISTRATION_NAMES
        .iter()
        .find(|(model, _)| *model == model_name)
        .map(|(_, name)| *name)
        .unwrap_or(DEFAULT_REGISTRATION_NAME)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn response(xml: &str) -> Element {
        Element::parse(xml).unwrap()
    }

    #[test]
    fn test_full_environment() {
        let resp = response(
            "<Response><Version>1.0</Version>\
             <Device><Manufacturer>Panasonic</Manufacturer><ModelName>AK-UC3000</ModelName>\
             <SerialNo.>A1B2</SerialNo.><AdditionalFunction>0x01</AdditionalFunction>\
             <CmdTimeout>30</CmdTimeout></Device>\
             <RTInfo><Port>50000</Port></RTInfo></Response>",
        );
        let env = EnvironmentInfo::from_response(&resp).unwrap();
        assert_eq!(env.version, "1.0");
        assert_eq!(env.udp_port, Some(50000));
        assert_eq!(env.device.manufacturer, "Panasonic");
        assert_eq!(env.device.model_name, "AK-UC3000");
        assert_eq!(env.device.serial_number, "A1B2");
        assert_eq!(env.device.additional_function, "0x01");
        assert_eq!(env.device.cmd_timeout, Some(30));
    }

    #[test]
    fn test_version_only() {
        let env = EnvironmentInfo::from_response(&response(
            "<Response><Version>2.1</Version></Response>",
        ))
        .unwrap();
        assert_eq!(env.version, "2.1");
        assert_eq!(env.udp_port, None);
        assert_eq!(env.device, DeviceInfo::default());
    }

    #[test]
    fn test_missing_version() {
        let resp = response("<Response><RTInfo><Port>50000</Port></RTInfo></Response>");
        assert!(EnvironmentInfo::from_response(&resp).is_none());
    }

    #[test]
    fn test_unparsable_port() {
        let env = EnvironmentInfo::from_response(&response(
            "<Response><Version>1.0</Version><RTInfo><Port>none</Port></RTInfo></Response>",
        ))
        .unwrap();
        assert_eq!(env.udp_port, None);
    }

    #[test]
    fn test_registration_names() {
        assert_eq!(registration_name("HC-X2"), "RC_SemiProApp_NodeJS");
        assert_eq!(registration_name("HC-X20"), "RC_SemiProApp_NodeJS");
        assert_eq!(registration_name("CX350"), "RC_AllianceApp");
        assert_eq!(registration_name("EVA1"), "RC_AllianceApp");
        assert_eq!(registration_name("AK-UC3000"), DEFAULT_REGISTRATION_NAME);
        assert_eq!(registration_name(""), DEFAULT_REGISTRATION_NAME);
        // Lookup is exact.
        assert_eq!(registration_name("hc-x2"), DEFAULT_REGISTRATION_NAME);
    }

    #[test]
    fn test_registration_table_is_exhaustive() {
        for (model, name) in REGISTRATION_NAMES {
            assert_eq!(registration_name(model), *name);
            assert!(name.starts_with("RC_"));
        }
    }
}
