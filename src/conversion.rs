//! Conversions between the user-facing control surface and the device's
//! register encoding.
//!
//! The operator sees a single 0–100% fan speed and a handful of named modes.
//! The device sees per-fan percentage registers with a nonlinear, per-channel
//! useful range, small integer mode codes, and status bitfields. Everything
//! that translates between the two lives here; nothing in this module touches
//! the transport.

use crate::registers::RegisterIndex;

/// One of the two independently driven fans.
///
/// Register value 0 always means "fan off", register value 1 is the minimum
/// powered value, and the channel saturates at `max_register` — the fan
/// reaches its maximum RPM well before the register scale reaches 100.
pub struct FanChannel {
    /// Lowest observed fan speed, at `min_register`.
    pub min_rpm: u16,
    /// Highest observed fan speed, at `max_register` and beyond.
    pub max_rpm: u16,
    /// Smallest register value at which the fan runs.
    pub min_register: u16,
    /// Register value at which the fan first reaches `max_rpm`.
    pub max_register: u16,
}

/// Supply fan: 380–2300 rpm over register values 1–60.
pub const SUPPLY: FanChannel =
    FanChannel { min_rpm: 380, max_rpm: 2300, min_register: 1, max_register: 60 };

/// Exhaust fan: 400–1840 rpm over register values 1–50.
pub const EXHAUST: FanChannel =
    FanChannel { min_rpm: 400, max_rpm: 1840, min_register: 1, max_register: 50 };

/// The supply fan is driven proportionally harder than the exhaust fan to
/// keep the building at a slight positive pressure. The bias is not applied
/// numerically anywhere: mapping the same user percentage onto the supply
/// channel's wider register span yields supply RPM about this much above
/// exhaust RPM.
pub const SUPPLY_RPM_MULTIPLIER: f64 = 1.25;

/// Speed a fan turns on at when no speed was requested and none is cached.
pub const DEFAULT_TURN_ON_PERCENTAGE: u16 = 30;

const _: () = {
    assert!(SUPPLY.min_register == 1 && EXHAUST.min_register == 1);
    assert!(SUPPLY.max_register < 100 && EXHAUST.max_register < 100);
};

impl FanChannel {
    const fn register_span(&self) -> u16 {
        self.max_register - self.min_register
    }

    /// Map a user percentage in 1..=100 onto this channel's register range.
    ///
    /// 1 lands exactly on `min_register` (guaranteed minimum powered speed)
    /// and 100 exactly on `max_register`; values in between interpolate
    /// linearly in register position and round down.
    pub fn register_for(&self, user_percentage: u16) -> u16 {
        let user_percentage = user_percentage.clamp(1, 100);
        let fraction = f64::from(user_percentage - 1) / 99.0;
        let raw = f64::from(self.min_register) + fraction * f64::from(self.register_span());
        (raw.floor() as u16).clamp(self.min_register, self.max_register)
    }

    /// Invert [`Self::register_for`]. 0 stays the "off" sentinel.
    pub fn user_percentage_for(&self, register_pct: u16) -> u16 {
        if register_pct == 0 {
            return 0;
        }
        let register_pct = register_pct.clamp(self.min_register, self.max_register);
        let fraction =
            f64::from(register_pct - self.min_register) / f64::from(self.register_span());
        let raw = 1.0 + fraction * 99.0;
        (raw.floor() as u16).min(100)
    }
}

/// Convert the user's 0–100% fan speed into `(supply, exhaust)` register
/// percentages. 0 produces `(0, 0)`, the only inputs yielding a 0 register
/// value.
pub fn register_percentages(user_percentage: u16) -> (u16, u16) {
    if user_percentage == 0 {
        return (0, 0);
    }
    (SUPPLY.register_for(user_percentage), EXHAUST.register_for(user_percentage))
}

/// Recover the user percentage from the exhaust register value.
///
/// The exhaust channel is the canonical reference: the supply register is
/// read alongside it but never consulted here, mirroring the forward mapping
/// which derives both outputs from the same user value. Supply-side drift is
/// therefore invisible to this function.
pub fn user_percentage(exhaust_register_pct: u16) -> u16 {
    EXHAUST.user_percentage_for(exhaust_register_pct)
}

/// A mode selector backed by a single enumerated-code register.
///
/// Implemented by the two closed device enumerations so that one controller
/// can drive both selectors.
pub trait ModeOption:
    Copy + PartialEq + std::fmt::Display + std::str::FromStr + strum::VariantNames + 'static
{
    const REGISTER: RegisterIndex;
    /// Reported for register codes outside the documented enumeration; the
    /// device can transiently report vendor-reserved values.
    const FALLBACK: Self;

    fn from_register(code: u16) -> Self;

    fn to_register(self) -> u16;
}

macro_rules! mode_option {
    (
        $(#[$meta:meta])*
        $vis:vis enum $name:ident for $register:ident (fallback $fallback:ident) {
            $($variant:ident = $code:literal),* $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(
            Clone, Copy, Debug, PartialEq, Eq,
            strum::Display, strum::EnumString, strum::FromRepr, strum::VariantNames,
        )]
        #[strum(serialize_all = "title_case")]
        #[repr(u16)]
        $vis enum $name {
            $($variant = $code),*
        }

        impl ModeOption for $name {
            const REGISTER: RegisterIndex = RegisterIndex::$register;
            const FALLBACK: Self = Self::$fallback;

            fn from_register(code: u16) -> Self {
                Self::from_repr(code).unwrap_or(Self::FALLBACK)
            }

            fn to_register(self) -> u16 {
                self as u16
            }
        }
    };
}

mode_option! {
    /// Heat exchanger bypass selection.
    pub enum BypassMode for BYPASS_FUNCTION (fallback HeatExchange) {
        HeatExchange = 0,
        Bypass = 1,
        Auto = 2,
    }
}

mode_option! {
    /// Air path selection between heat exchange and indoor recirculation.
    pub enum CirculationMode for INTERNAL_CIRCULATION (fallback HeatExchange) {
        HeatExchange = 0,
        InternalCirculation = 1,
    }
}

mode_option! {
    /// Airflow level selection. `Low` is the level driven by the level-1
    /// percentage registers, which is what the fan controller writes.
    pub enum AirflowLevel for FAN_SPEED_SETTING (fallback Low) {
        Low = 1,
        Medium = 2,
        High = 3,
    }
}

/// A status bitfield register decoded into named flags.
///
/// Snapshots are rebuilt from the raw word on every read and never cached
/// partially.
pub trait StatusWord: Copy {
    const REGISTER: RegisterIndex;
    fn decode(word: u16) -> Self;
}

/// Decoded `ABNORMAL_STATUS` fault bits.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize)]
pub struct AbnormalStatus {
    pub eeprom_error: bool,
    pub indoor_temp_error: bool,
    pub outdoor_temp_error: bool,
    pub exhaust_fan_error: bool,
    pub supply_fan_error: bool,
    pub raw: u16,
}

impl AbnormalStatus {
    const EEPROM: u16 = 0x08;
    const INDOOR_TEMP: u16 = 0x10;
    const OUTDOOR_TEMP: u16 = 0x20;
    const EXHAUST_FAN: u16 = 0x40;
    const SUPPLY_FAN: u16 = 0x80;

    pub fn has_fault(&self) -> bool {
        self.eeprom_error
            || self.indoor_temp_error
            || self.outdoor_temp_error
            || self.exhaust_fan_error
            || self.supply_fan_error
    }
}

impl StatusWord for AbnormalStatus {
    const REGISTER: RegisterIndex = RegisterIndex::ABNORMAL_STATUS;

    fn decode(word: u16) -> Self {
        Self {
            eeprom_error: word & Self::EEPROM != 0,
            indoor_temp_error: word & Self::INDOOR_TEMP != 0,
            outdoor_temp_error: word & Self::OUTDOOR_TEMP != 0,
            exhaust_fan_error: word & Self::EXHAUST_FAN != 0,
            supply_fan_error: word & Self::SUPPLY_FAN != 0,
            raw: word,
        }
    }
}

impl std::fmt::Display for AbnormalStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(if self.has_fault() { "Error" } else { "Normal" })
    }
}

/// Decoded `SYSTEM_STATUS` operating bits.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize)]
pub struct SystemStatus {
    pub running: bool,
    pub bypass_active: bool,
    pub internal_circulation: bool,
    pub low_temp_protection: bool,
    pub raw: u16,
}

impl SystemStatus {
    const RUNNING: u16 = 0x0001;
    const BYPASS_ACTIVE: u16 = 0x0010;
    const INTERNAL_CIRCULATION: u16 = 0x0020;
    const LOW_TEMP_PROTECTION: u16 = 0x0040;
}

impl StatusWord for SystemStatus {
    const REGISTER: RegisterIndex = RegisterIndex::SYSTEM_STATUS;

    fn decode(word: u16) -> Self {
        Self {
            running: word & Self::RUNNING != 0,
            bypass_active: word & Self::BYPASS_ACTIVE != 0,
            internal_circulation: word & Self::INTERNAL_CIRCULATION != 0,
            low_temp_protection: word & Self::LOW_TEMP_PROTECTION != 0,
            raw: word,
        }
    }
}

impl std::fmt::Display for SystemStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(if self.running { "Running" } else { "Stopped" })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_is_off_on_both_channels() {
        assert_eq!(register_percentages(0), (0, 0));
        assert_eq!(user_percentage(0), 0);
    }

    #[test]
    fn boundaries_are_exact() {
        assert_eq!(register_percentages(1), (SUPPLY.min_register, EXHAUST.min_register));
        assert_eq!(register_percentages(100), (SUPPLY.max_register, EXHAUST.max_register));
        assert_eq!(user_percentage(EXHAUST.min_register), 1);
        assert_eq!(user_percentage(EXHAUST.max_register), 100);
    }

    #[test]
    fn forward_interpolates_with_floor() {
        // 1 + floor(44/99 * 59) and 1 + floor(44/99 * 49).
        assert_eq!(register_percentages(45), (27, 22));
    }

    #[test]
    fn forward_is_monotone_and_in_range() {
        let mut previous = (0, 0);
        for p in 0..=100 {
            let (supply, exhaust) = register_percentages(p);
            assert!(supply >= previous.0 && exhaust >= previous.1, "p={p}");
            if p > 0 {
                assert!((SUPPLY.min_register..=SUPPLY.max_register).contains(&supply));
                assert!((EXHAUST.min_register..=EXHAUST.max_register).contains(&exhaust));
            }
            previous = (supply, exhaust);
        }
    }

    #[test]
    fn round_trip_loses_at_most_the_floor_step() {
        // The exhaust register span (49 steps) cannot represent 99 user steps
        // distinctly, so the round trip through the floor mapping can lose up
        // to three user points. It never overshoots and is exact at both
        // boundaries (asserted above).
        for p in 1..=100u16 {
            let (_, exhaust) = register_percentages(p);
            let back = user_percentage(exhaust);
            assert!(back <= p, "p={p} back={back}");
            assert!(p - back <= 3, "p={p} back={back}");
        }
    }

    #[test]
    fn reverse_clamps_out_of_range_registers() {
        assert_eq!(user_percentage(EXHAUST.max_register + 20), 100);
        assert_eq!(user_percentage(99), 100);
    }

    #[test]
    fn supply_channel_carries_the_pressure_bias() {
        let ratio = f64::from(SUPPLY.max_rpm) / f64::from(EXHAUST.max_rpm);
        assert!((ratio - SUPPLY_RPM_MULTIPLIER).abs() < 0.01);
    }

    #[test]
    fn unknown_mode_codes_fall_back() {
        assert_eq!(BypassMode::from_register(2), BypassMode::Auto);
        assert_eq!(BypassMode::from_register(7), BypassMode::HeatExchange);
        assert_eq!(CirculationMode::from_register(1), CirculationMode::InternalCirculation);
        assert_eq!(CirculationMode::from_register(9), CirculationMode::HeatExchange);
        assert_eq!(AirflowLevel::from_register(2), AirflowLevel::Medium);
        assert_eq!(AirflowLevel::from_register(0), AirflowLevel::Low);
    }

    #[test]
    fn mode_labels_round_trip() {
        assert_eq!(BypassMode::HeatExchange.to_string(), "Heat Exchange");
        assert_eq!("Heat Exchange".parse::<BypassMode>().unwrap(), BypassMode::HeatExchange);
        assert_eq!("Auto".parse::<BypassMode>().unwrap().to_register(), 2);
        assert_eq!(
            "Internal Circulation".parse::<CirculationMode>().unwrap().to_register(),
            1,
        );
        assert!("Turbo".parse::<BypassMode>().is_err());
    }

    #[test]
    fn status_bits_decode() {
        let clear = AbnormalStatus::decode(0x0000);
        assert!(!clear.has_fault());
        assert_eq!(clear.to_string(), "Normal");

        let faulty = AbnormalStatus::decode(0x00C8);
        assert!(faulty.eeprom_error && faulty.exhaust_fan_error && faulty.supply_fan_error);
        assert!(!faulty.indoor_temp_error && !faulty.outdoor_temp_error);
        assert_eq!(faulty.to_string(), "Error");
        assert_eq!(faulty.raw, 0x00C8);

        let system = SystemStatus::decode(0x0031);
        assert!(system.running && system.bypass_active && system.internal_circulation);
        assert!(!system.low_temp_protection);
        assert_eq!(system.to_string(), "Running");
        assert_eq!(SystemStatus::decode(0).to_string(), "Stopped");
    }
}
