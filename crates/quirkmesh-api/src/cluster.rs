// ── Canonical cluster identifiers ──
//
// One enumerated type for every cluster the host knows how to drive.
// Internal code matches on variants, never on string names; the
// registry-load boundary owns the translation from legacy spellings.

use serde::{Deserialize, Serialize};
use strum::{EnumIter, IntoEnumIterator};

/// Application-layer cluster, identified by its 16-bit protocol code.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    EnumIter,
    strum::Display,
    strum::EnumString,
    strum::IntoStaticStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ClusterId {
    // General
    Basic,
    PowerConfiguration,
    DeviceTemperature,
    Identify,
    Groups,
    Scenes,
    OnOff,
    OnOffSwitchConfig,
    LevelControl,
    Alarms,
    Time,
    AnalogInput,
    BinaryInput,
    MultistateInput,
    Ota,
    PollControl,

    // Closures
    DoorLock,
    WindowCovering,

    // HVAC
    Thermostat,
    FanControl,

    // Lighting
    ColorControl,

    // Measurement & sensing
    IlluminanceMeasurement,
    TemperatureMeasurement,
    PressureMeasurement,
    RelativeHumidity,
    OccupancySensing,
    SoilMoisture,
    Pm25Measurement,

    // Security
    IasZone,
    IasAce,
    IasWd,

    // Smart energy
    Metering,
    ElectricalMeasurement,
    Diagnostics,

    // Manufacturer-specific
    TuyaPrivate,
    TuyaE000,
    TuyaE001,
}

impl ClusterId {
    /// The 16-bit cluster code carried on the wire.
    pub const fn code(self) -> u16 {
        match self {
            Self::Basic => 0x0000,
            Self::PowerConfiguration => 0x0001,
            Self::DeviceTemperature => 0x0002,
            Self::Identify => 0x0003,
            Self::Groups => 0x0004,
            Self::Scenes => 0x0005,
            Self::OnOff => 0x0006,
            Self::OnOffSwitchConfig => 0x0007,
            Self::LevelControl => 0x0008,
            Self::Alarms => 0x0009,
            Self::Time => 0x000A,
            Self::AnalogInput => 0x000C,
            Self::BinaryInput => 0x000F,
            Self::MultistateInput => 0x0012,
            Self::Ota => 0x0019,
            Self::PollControl => 0x0020,
            Self::DoorLock => 0x0101,
            Self::WindowCovering => 0x0102,
            Self::Thermostat => 0x0201,
            Self::FanControl => 0x0202,
            Self::ColorControl => 0x0300,
            Self::IlluminanceMeasurement => 0x0400,
            Self::TemperatureMeasurement => 0x0402,
            Self::PressureMeasurement => 0x0403,
            Self::RelativeHumidity => 0x0405,
            Self::OccupancySensing => 0x0406,
            Self::SoilMoisture => 0x0408,
            Self::Pm25Measurement => 0x042A,
            Self::IasZone => 0x0500,
            Self::IasAce => 0x0501,
            Self::IasWd => 0x0502,
            Self::Metering => 0x0702,
            Self::ElectricalMeasurement => 0x0B04,
            Self::Diagnostics => 0x0B05,
            Self::TuyaPrivate => 0xEF00,
            Self::TuyaE000 => 0xE000,
            Self::TuyaE001 => 0xE001,
        }
    }

    /// Reverse lookup from a wire code.
    pub fn from_code(code: u16) -> Option<Self> {
        Self::iter().find(|c| c.code() == code)
    }

    /// Security clusters whose notifications follow the zone handshake.
    pub const fn is_security(self) -> bool {
        matches!(self, Self::IasZone | Self::IasAce | Self::IasWd)
    }

    /// Clusters that require the enroll request/response handshake
    /// before the device treats the host as its alarm sink.
    pub const fn requires_enrollment(self) -> bool {
        matches!(self, Self::IasZone)
    }

    pub const fn is_manufacturer_specific(self) -> bool {
        self.code() >= 0xFC00 || matches!(self, Self::TuyaE000 | Self::TuyaE001)
    }
}
