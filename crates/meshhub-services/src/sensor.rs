//! Sensor decoder: what each node kind is polled for, and how its
//! responses turn into named telemetry values.

use meshhub_core::node::{NodeDef, SensorKind};
use meshhub_core::wire::{read_i32_le, Packet, PacketType, WireError};
use serde::{Deserialize, Serialize};

/// One polled telemetry value: the request that asks for it and the metric
/// name it is reported under.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Telemetry {
    pub request: PacketType,
    pub metric: &'static str,
}

const MOISTURE_TELEMETRY: [Telemetry; 4] = [
    Telemetry {
        request: PacketType::BatteryPctReq,
        metric: "batteryPercent",
    },
    Telemetry {
        request: PacketType::BatteryVoltageReq,
        metric: "batteryVoltage",
    },
    Telemetry {
        request: PacketType::MoisturePctReq,
        metric: "moisturePercent",
    },
    Telemetry {
        request: PacketType::MoistureVoltageReq,
        metric: "moistureVoltage",
    },
];

/// The poll sequence for a node kind, in send order.
pub fn telemetry_for(kind: SensorKind) -> &'static [Telemetry] {
    match kind {
        SensorKind::Moisture => &MOISTURE_TELEMETRY,
    }
}

/// Node settings the hub can push down with a config-update request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfigSetting {
    SensorHighVoltage,
    SensorLowVoltage,
    BatteryHighVoltage,
    BatteryLowVoltage,
    SleepDuration,
}

impl ConfigSetting {
    pub const fn request_type(self) -> PacketType {
        match self {
            ConfigSetting::SensorHighVoltage => PacketType::SensorHvUpdate,
            ConfigSetting::SensorLowVoltage => PacketType::SensorLvUpdate,
            ConfigSetting::BatteryHighVoltage => PacketType::BatteryHvUpdate,
            ConfigSetting::BatteryLowVoltage => PacketType::BatteryLvUpdate,
            ConfigSetting::SleepDuration => PacketType::SleepDurationUpdate,
        }
    }

    /// The setting an acknowledgement type confirms.
    pub fn from_ack(ack: PacketType) -> Option<Self> {
        [
            ConfigSetting::SensorHighVoltage,
            ConfigSetting::SensorLowVoltage,
            ConfigSetting::BatteryHighVoltage,
            ConfigSetting::BatteryLowVoltage,
            ConfigSetting::SleepDuration,
        ]
        .into_iter()
        .find(|setting| setting.request_type().response() == Some(ack))
    }
}

/// A decoded telemetry value bound for the data sink.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reading {
    pub node: NodeDef,
    pub metric: &'static str,
    pub value: i32,
}

/// Outcome of interpreting a response a node was asked for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decoded {
    Reading(Reading),
    ConfigAck(ConfigSetting),
    /// A response type this node kind does not produce.
    Unexpected,
}

/// Map a response packet to a telemetry value or config acknowledgement.
pub fn decode_response(node: &NodeDef, packet: &Packet) -> Result<Decoded, WireError> {
    let kind = packet.packet_type();
    if let Some(telemetry) = telemetry_for(node.kind)
        .iter()
        .find(|t| t.request.response() == Some(kind))
    {
        let value = read_i32_le(packet.data())?;
        return Ok(Decoded::Reading(Reading {
            node: node.clone(),
            metric: telemetry.metric,
            value,
        }));
    }
    Ok(ConfigSetting::from_ack(kind)
        .map(Decoded::ConfigAck)
        .unwrap_or(Decoded::Unexpected))
}
