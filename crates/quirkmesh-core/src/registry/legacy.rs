// ── Cluster name translation ──
//
// Catalogs collected over the years spell clusters in several dialects:
// herdsman-style camelCase ("genOnOff", "ssIasZone"), constant style
// ("IAS_ZONE", "LEVEL_CTRL"), bare numbers ("1280", "0x0500") and our own
// snake_case. Everything is folded into `ClusterId` here, once, at load.

use std::str::FromStr;

use quirkmesh_api::ClusterId;

/// Known non-canonical spellings. Compared case-insensitively.
const ALIASES: &[(&str, ClusterId)] = &[
    ("genBasic", ClusterId::Basic),
    ("genPowerCfg", ClusterId::PowerConfiguration),
    ("powerCfg", ClusterId::PowerConfiguration),
    ("power_cfg", ClusterId::PowerConfiguration),
    ("genDeviceTempCfg", ClusterId::DeviceTemperature),
    ("genIdentify", ClusterId::Identify),
    ("genGroups", ClusterId::Groups),
    ("genScenes", ClusterId::Scenes),
    ("genOnOff", ClusterId::OnOff),
    ("genOnOffSwitchCfg", ClusterId::OnOffSwitchConfig),
    ("genLevelCtrl", ClusterId::LevelControl),
    ("levelCtrl", ClusterId::LevelControl),
    ("level_ctrl", ClusterId::LevelControl),
    ("genAlarms", ClusterId::Alarms),
    ("genTime", ClusterId::Time),
    ("genAnalogInput", ClusterId::AnalogInput),
    ("genBinaryInput", ClusterId::BinaryInput),
    ("genMultistateInput", ClusterId::MultistateInput),
    ("genOta", ClusterId::Ota),
    ("genPollCtrl", ClusterId::PollControl),
    ("closuresDoorLock", ClusterId::DoorLock),
    ("closuresWindowCovering", ClusterId::WindowCovering),
    ("hvacThermostat", ClusterId::Thermostat),
    ("hvacFanCtrl", ClusterId::FanControl),
    ("lightingColorCtrl", ClusterId::ColorControl),
    ("color_ctrl", ClusterId::ColorControl),
    ("msIlluminanceMeasurement", ClusterId::IlluminanceMeasurement),
    ("msTemperatureMeasurement", ClusterId::TemperatureMeasurement),
    ("msPressureMeasurement", ClusterId::PressureMeasurement),
    ("msRelativeHumidity", ClusterId::RelativeHumidity),
    ("humidityMeasurement", ClusterId::RelativeHumidity),
    ("humidity_measurement", ClusterId::RelativeHumidity),
    ("msOccupancySensing", ClusterId::OccupancySensing),
    ("msSoilMoisture", ClusterId::SoilMoisture),
    ("pm25Measurement", ClusterId::Pm25Measurement),
    ("ssIasZone", ClusterId::IasZone),
    ("iasZone", ClusterId::IasZone),
    ("ssIasAce", ClusterId::IasAce),
    ("ssIasWd", ClusterId::IasWd),
    ("seMetering", ClusterId::Metering),
    ("haElectricalMeasurement", ClusterId::ElectricalMeasurement),
    ("haDiagnostic", ClusterId::Diagnostics),
    ("manuSpecificTuya", ClusterId::TuyaPrivate),
    ("tuyaSpecific", ClusterId::TuyaPrivate),
    ("tuya", ClusterId::TuyaPrivate),
    ("manuSpecificTuya_2", ClusterId::TuyaE000),
    ("manuSpecificTuya_3", ClusterId::TuyaE001),
];

/// Translate any supported cluster spelling into a canonical id.
pub fn canonical_cluster(name: &str) -> Option<ClusterId> {
    let name = name.trim();
    if name.is_empty() {
        return None;
    }

    if let Some(code) = parse_code(name) {
        return ClusterId::from_code(code);
    }

    if let Some((_, id)) = ALIASES
        .iter()
        .find(|(alias, _)| alias.eq_ignore_ascii_case(name))
    {
        return Some(*id);
    }

    // snake_case and SCREAMING_CASE both fold onto the strum names;
    // camelCase like "onOff" or "iasZone" gets underscores inserted.
    ClusterId::from_str(&name.to_ascii_lowercase())
        .or_else(|_| ClusterId::from_str(&camel_to_snake(name)))
        .ok()
}

fn parse_code(name: &str) -> Option<u16> {
    if let Some(hex) = name
        .strip_prefix("0x")
        .or_else(|| name.strip_prefix("0X"))
    {
        return u16::from_str_radix(hex, 16).ok();
    }
    if name.bytes().all(|b| b.is_ascii_digit()) {
        return name.parse().ok();
    }
    None
}

fn camel_to_snake(name: &str) -> String {
    let mut out = String::with_capacity(name.len() + 4);
    for (i, ch) in name.chars().enumerate() {
        if ch.is_ascii_uppercase() {
            if i > 0 {
                out.push('_');
            }
            out.push(ch.to_ascii_lowercase());
        } else {
            out.push(ch);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_dialect_folds_to_one_id() {
        for spelling in ["genOnOff", "onOff", "on_off", "ON_OFF", "6", "0x0006"] {
            assert_eq!(canonical_cluster(spelling), Some(ClusterId::OnOff), "{spelling}");
        }
        for spelling in ["ssIasZone", "iasZone", "IAS_ZONE", "ias_zone", "1280", "0x0500"] {
            assert_eq!(canonical_cluster(spelling), Some(ClusterId::IasZone), "{spelling}");
        }
    }

    #[test]
    fn constant_style_abbreviations() {
        assert_eq!(canonical_cluster("LEVEL_CTRL"), Some(ClusterId::LevelControl));
        assert_eq!(canonical_cluster("genLevelCtrl"), Some(ClusterId::LevelControl));
        assert_eq!(canonical_cluster("manuSpecificTuya"), Some(ClusterId::TuyaPrivate));
        assert_eq!(canonical_cluster("0xEF00"), Some(ClusterId::TuyaPrivate));
    }

    #[test]
    fn unknown_names_are_rejected() {
        assert_eq!(canonical_cluster("genFrobnicator"), None);
        assert_eq!(canonical_cluster(""), None);
        assert_eq!(canonical_cluster("0x7777"), None);
        assert_eq!(canonical_cluster("99999999"), None);
    }
}
