//! Binary telemetry records pushed by the camera over UDP.
//!
//! Datagrams are raw big-endian binary. Byte 0 is the record type; only
//! camera status (0x0A) and optical setting (0x06) records are decoded.
//!
//! Camera status layout (28 bytes):
//!
//! ```text
//! offset  size  field
//!   0      1    record type (0x0A)
//!  11      1    white balance channel (0 = preset, 1 = A, 2 = B)
//!  12      2    red gain (i16)
//!  14      2    blue gain (i16)
//!  16      8    master/red/green/blue pedestal (4 x i16)
//!  26      2    iris (u16)
//! ```
//!
//! Optical setting layout (63 bytes):
//!
//! ```text
//! offset  size  field
//!   0      1    record type (0x06)
//!   8      2    iris x10 (u16; 0 = open, 0xFFFF = close)
//!  10      2    focus (compact float, metres)
//!  12      2    zoom (compact float, metres)
//!  14     30    lens model (text)
//!  44      2    master gain (i16 dB, or u16 ISO/10 per gain unit bit)
//!  46      2    shutter integer part (u16)
//!  48      1    shutter mode
//!  49      1    shutter decimal part
//!  50      1    gamma
//!  52      2    ATW [15:14], colour temperature state [13:12], value [11:0]
//!  54      1    ND filter
//!  55      1    colour correction filter
//!  57      1    AGC [7], gain unit [6], R/G gain disabled [3], iris unit [2], ND mode [0]
//!  58      2    frame rate (u16)
//!  62      1    AWB enabled [2], AWB channel / colour temperature x100 [0]
//! ```

use crate::bits::{bit, compact_float, get_bits};
use crate::error::ProtocolError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Minimum length of a camera status record.
pub const CAMERA_STATUS_LEN: usize = 28;

/// Minimum length of an optical setting record.
pub const OPTICAL_SETTING_LEN: usize = 63;

/// Telemetry record type (byte 0 of every datagram).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RecordType {
    Event,
    TimeCode,
    MediaResidualQuantityP2Card,
    PowerSupplyState,
    AudioInformation,
    OpticalSetting,
    Status,
    MediaResidualQuantityMicroP2CardAndTotal,
    CameraStatus,
    StatusAndInformationChangeEvent,
    Unknown(u8),
}

impl RecordType {
    pub fn from_code(code: u8) -> Self {
        match code {
            0x00 => RecordType::Event,
            0x01 => RecordType::TimeCode,
            0x02 => RecordType::MediaResidualQuantityP2Card,
            0x03 => RecordType::PowerSupplyState,
            0x04 => RecordType::AudioInformation,
            0x06 => RecordType::OpticalSetting,
            0x08 => RecordType::Status,
            0x09 => RecordType::MediaResidualQuantityMicroP2CardAndTotal,
            0x0A => RecordType::CameraStatus,
            0x0B => RecordType::StatusAndInformationChangeEvent,
            other => RecordType::Unknown(other),
        }
    }

    pub fn code(&self) -> u8 {
        match self {
            RecordType::Event => 0x00,
            RecordType::TimeCode => 0x01,
            RecordType::MediaResidualQuantityP2Card => 0x02,
            RecordType::PowerSupplyState => 0x03,
            RecordType::AudioInformation => 0x04,
            RecordType::OpticalSetting => 0x06,
            RecordType::Status => 0x08,
            RecordType::MediaResidualQuantityMicroP2CardAndTotal => 0x09,
            RecordType::CameraStatus => 0x0A,
            RecordType::StatusAndInformationChangeEvent => 0x0B,
            RecordType::Unknown(code) => *code,
        }
    }
}

/// White balance channel selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WhiteBalanceChannel {
    Preset,
    A,
    B,
    Unknown(u8),
}

impl From<u8> for WhiteBalanceChannel {
    fn from(raw: u8) -> Self {
        match raw {
            0 => WhiteBalanceChannel::Preset,
            1 => WhiteBalanceChannel::A,
            2 => WhiteBalanceChannel::B,
            other => WhiteBalanceChannel::Unknown(other),
        }
    }
}

/// Exposure state from a camera status record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExposureState {
    pub white_balance_channel: WhiteBalanceChannel,
    pub red_gain: i16,
    pub blue_gain: i16,
    pub master_pedestal: i16,
    pub red_pedestal: i16,
    pub green_pedestal: i16,
    pub blue_pedestal: i16,
    pub iris: u16,
}

impl ExposureState {
    /// Decodes a camera status record.
    pub fn decode(data: &[u8]) -> Result<Self, ProtocolError> {
        ensure_len(data, CAMERA_STATUS_LEN, "CameraStatus")?;

        Ok(Self {
            white_balance_channel: WhiteBalanceChannel::from(data[11]),
            red_gain: i16_at(data, 12),
            blue_gain: i16_at(data, 14),
            master_pedestal: i16_at(data, 16),
            red_pedestal: i16_at(data, 18),
            green_pedestal: i16_at(data, 20),
            blue_pedestal: i16_at(data, 22),
            iris: u16_at(data, 26),
        })
    }
}

/// Iris position.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Iris {
    Open,
    Close,
    /// F-stop or T-stop value.
    Stop(f64),
}

impl Iris {
    /// Raw value signalling a fully closed iris.
    pub const CLOSE_RAW: u16 = 0xFFFF;

    /// Interprets the raw field, which carries the stop value times ten.
    pub fn from_raw(raw: u16) -> Self {
        match raw {
            0 => Iris::Open,
            Self::CLOSE_RAW => Iris::Close,
            value => Iris::Stop(f64::from(value) / 10.0),
        }
    }
}

impl fmt::Display for Iris {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Iris::Open => write!(f, "OPEN"),
            Iris::Close => write!(f, "CLOSE"),
            Iris::Stop(value) => write!(f, "{}", value),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IrisUnit {
    F,
    T,
}

/// Shutter mode byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ShutterMode {
    ShutterOff,
    FixedCommonFraction,
    SynchroCommonFraction,
    Half,
    SynchroDecimal,
    StaticNumerator,
    Unknown(u8),
}

impl From<u8> for ShutterMode {
    fn from(raw: u8) -> Self {
        match raw {
            0 => ShutterMode::ShutterOff,
            1 => ShutterMode::FixedCommonFraction,
            3 => ShutterMode::SynchroCommonFraction,
            4 => ShutterMode::Half,
            5 => ShutterMode::SynchroDecimal,
            // Mode 6 is reported for static numerator shutters too.
            6 | 8 => ShutterMode::StaticNumerator,
            other => ShutterMode::Unknown(other),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ShutterUnit {
    Seconds,
    Degrees,
    Unknown,
}

impl fmt::Display for ShutterUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ShutterUnit::Seconds => write!(f, "s"),
            ShutterUnit::Degrees => write!(f, "deg"),
            ShutterUnit::Unknown => write!(f, "?"),
        }
    }
}

/// Rendered shutter speed or angle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Shutter {
    pub mode: ShutterMode,
    pub value: String,
    pub unit: ShutterUnit,
}

impl Shutter {
    pub fn new(mode: ShutterMode, integer: u16, decimal: u8) -> Self {
        // FixedCommonFraction is also documented with a degrees rendering
        // ("{integer}.{decimal}" deg). It is unclear which the camera means;
        // only the seconds form is produced until that is confirmed.
        let (value, unit) = match mode {
            ShutterMode::FixedCommonFraction => (format!("1/{}", integer), ShutterUnit::Seconds),
            ShutterMode::SynchroCommonFraction | ShutterMode::StaticNumerator => {
                (format!("1/{}.{}", integer, decimal), ShutterUnit::Seconds)
            }
            ShutterMode::SynchroDecimal => {
                (format!("{}.{}", integer, decimal), ShutterUnit::Degrees)
            }
            _ => ("?".to_string(), ShutterUnit::Unknown),
        };
        Self { mode, value, unit }
    }
}

impl fmt::Display for Shutter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.value, self.unit)
    }
}

/// Gamma curve.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Gamma {
    Hd,
    Sd,
    FilmLike1,
    FilmLike2,
    FilmLike3,
    FilmRec,
    Default,
    VideoRec,
    CineLikeD,
    CineLikeV,
    Still,
    Hlg,
    V255570L1,
    V504580L1,
    Video,
    Unknown(u8),
}

impl From<u8> for Gamma {
    fn from(raw: u8) -> Self {
        match raw {
            0 => Gamma::Hd,
            1 => Gamma::Sd,
            2 => Gamma::FilmLike1,
            3 => Gamma::FilmLike2,
            4 => Gamma::FilmLike3,
            5 => Gamma::FilmRec,
            6 => Gamma::Default,
            7 => Gamma::VideoRec,
            8 => Gamma::CineLikeD,
            9 => Gamma::CineLikeV,
            10 => Gamma::Still,
            11 => Gamma::Hlg,
            12 => Gamma::V255570L1,
            13 => Gamma::V504580L1,
            14 => Gamma::Video,
            other => Gamma::Unknown(other),
        }
    }
}

/// Auto-tracking white balance validity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Atw {
    Invalid,
    Valid,
    ValidLock,
    Unknown(u8),
}

impl From<u8> for Atw {
    fn from(raw: u8) -> Self {
        match raw {
            0 => Atw::Invalid,
            1 => Atw::Valid,
            2 => Atw::ValidLock,
            other => Atw::Unknown(other),
        }
    }
}

/// Whether the colour temperature is within the correctable range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ColorTemperatureState {
    Under,
    Over,
    Correct,
    Unknown(u8),
}

impl From<u8> for ColorTemperatureState {
    fn from(raw: u8) -> Self {
        match raw {
            0 => ColorTemperatureState::Under,
            1 => ColorTemperatureState::Over,
            2 => ColorTemperatureState::Correct,
            other => ColorTemperatureState::Unknown(other),
        }
    }
}

/// ND filter setting.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum NdFilter {
    /// Fixed filter, rendered `1/n`.
    Fraction(u8),
    /// Variable filter, as a fraction of one.
    Transmission(f64),
}

impl fmt::Display for NdFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NdFilter::Fraction(denominator) => write!(f, "1/{}", denominator),
            NdFilter::Transmission(value) => write!(f, "{}", value),
        }
    }
}

/// Master gain, in dB or as an ISO rating depending on the gain unit bit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MasterGain {
    Decibels(i16),
    Iso(u32),
}

impl MasterGain {
    pub fn from_raw(raw: u16, iso: bool) -> Self {
        if iso {
            MasterGain::Iso(u32::from(raw) * 10)
        } else {
            MasterGain::Decibels(raw as i16)
        }
    }
}

impl fmt::Display for MasterGain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MasterGain::Decibels(db) => write!(f, "{}dB", db),
            MasterGain::Iso(iso) => write!(f, "ISO{}", iso),
        }
    }
}

/// Lens and exposure settings from an optical setting record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OpticalState {
    pub iris: Iris,
    pub iris_unit: IrisUnit,
    /// Focus distance in metres.
    pub focus: f64,
    /// Zoom position in millimetres.
    pub zoom: f64,
    pub lens_model: String,
    pub shutter: Shutter,
    pub gamma: Gamma,
    pub atw: Atw,
    pub awb_enabled: bool,
    pub awb_channel: WhiteBalanceChannel,
    /// Colour temperature in kelvin.
    pub color_temperature: u32,
    pub color_temperature_state: ColorTemperatureState,
    pub nd_filter: NdFilter,
    pub color_correction_filter: u8,
    pub auto_gain_control: bool,
    pub master_gain: MasterGain,
    pub rg_gain_enabled: bool,
    pub frame_rate: u16,
}

impl OpticalState {
    /// Decodes an optical setting record.
    pub fn decode(data: &[u8]) -> Result<Self, ProtocolError> {
        ensure_len(data, OPTICAL_SETTING_LEN, "OpticalSetting")?;

        let status = u32::from(data[57]);
        let white_balance = u32::from(u16_at(data, 52));
        let awb = u32::from(data[62]);

        let nd_filter = if bit(status, 0) {
            NdFilter::Transmission(f64::from(data[54]) / 100.0)
        } else {
            NdFilter::Fraction(data[54])
        };

        let color_temperature_scale = if bit(awb, 0) { 100 } else { 10 };

        Ok(Self {
            iris: Iris::from_raw(u16_at(data, 8)),
            iris_unit: if bit(status, 2) { IrisUnit::F } else { IrisUnit::T },
            focus: compact_float(u16_at(data, 10), 2),
            zoom: (compact_float(u16_at(data, 12), 4) * 10_000.0).round() / 10.0,
            lens_model: text_at(data, 14, 30),
            shutter: Shutter::new(ShutterMode::from(data[48]), u16_at(data, 46), data[49]),
            gamma: Gamma::from(data[50]),
            atw: Atw::from(get_bits(white_balance, 14, 15) as u8),
            awb_enabled: bit(awb, 2),
            awb_channel: if bit(awb, 0) {
                WhiteBalanceChannel::B
            } else {
                WhiteBalanceChannel::A
            },
            color_temperature: get_bits(white_balance, 0, 11) * color_temperature_scale,
            color_temperature_state: ColorTemperatureState::from(
                get_bits(white_balance, 12, 13) as u8,
            ),
            nd_filter,
            color_correction_filter: data[55],
            auto_gain_control: bit(status, 7),
            master_gain: MasterGain::from_raw(u16_at(data, 44), bit(status, 6)),
            rg_gain_enabled: !bit(status, 3),
            frame_rate: u16_at(data, 58),
        })
    }
}

/// A decoded telemetry record.
#[derive(Debug, Clone, PartialEq)]
pub enum TelemetryRecord {
    CameraStatus(ExposureState),
    OpticalSetting(OpticalState),
}

impl TelemetryRecord {
    /// Decodes a datagram.
    ///
    /// Returns `Ok(None)` for empty datagrams and record types that are not
    /// decoded.
    pub fn decode(data: &[u8]) -> Result<Option<Self>, ProtocolError> {
        let Some(&code) = data.first() else {
            return Ok(None);
        };

        match RecordType::from_code(code) {
            RecordType::CameraStatus => Ok(Some(TelemetryRecord::CameraStatus(
                ExposureState::decode(data)?,
            ))),
            RecordType::OpticalSetting => Ok(Some(TelemetryRecord::OpticalSetting(
                OpticalState::decode(data)?,
            ))),
            _ => Ok(None),
        }
    }
}

fn ensure_len(data: &[u8], needed: usize, record: &'static str) -> Result<(), ProtocolError> {
    if data.len() < needed {
        return Err(ProtocolError::PacketTooShort {
            record,
            needed,
            actual: data.len(),
        });
    }
    Ok(())
}

fn u16_at(data: &[u8], offset: usize) -> u16 {
    u16::from_be_bytes([data[offset], data[offset + 1]])
}

fn i16_at(data: &[u8], offset: usize) -> i16 {
    i16::from_be_bytes([data[offset], data[offset + 1]])
}

fn text_at(data: &[u8], offset: usize, len: usize) -> String {
    String::from_utf8_lossy(&data[offset..offset + len])
        .trim_end_matches(|c: char| c == '\0' || c.is_whitespace())
        .to_string()
}
