//! The Delta ERV holding register map.
//!
//! Addresses and value domains follow the vendor's RS485 specification
//! document. All registers are 16-bit holdings; addresses go on the wire
//! exactly as tabulated here (the device uses a 0-based map.)

/// The value domain of a register.
#[derive(Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DataType {
    /// Raw unsigned 16-bit quantity.
    U16,
    /// Two's-complement temperature in whole degrees Celsius.
    CEL,
    /// Percentage, valid values 0 through 100.
    PCT,
    /// Small integer code from a closed enumeration.
    ENU,
    /// Bitfield; individual bits carry independent flags.
    BIT,
}

impl DataType {
    pub fn from_word(self, word: u16) -> Value {
        match self {
            Self::U16 => Value::U16(word),
            Self::CEL => Value::Celsius(word as i16),
            Self::PCT => Value::Percentage(word),
            Self::ENU => Value::Code(word),
            Self::BIT => Value::Bitfield(word),
        }
    }

    pub const fn bytes(&self) -> usize {
        2
    }
}

impl std::fmt::Display for DataType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::U16 => "u16",
            Self::CEL => "celsius",
            Self::PCT => "percent",
            Self::ENU => "enum",
            Self::BIT => "bitfield",
        })
    }
}

/// A register value decoded according to its [`DataType`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Value {
    U16(u16),
    Celsius(i16),
    Percentage(u16),
    Code(u16),
    Bitfield(u16),
}

impl Value {
    /// The raw word as it appears on the wire.
    pub const fn raw(&self) -> u16 {
        match *self {
            Value::U16(n) | Value::Percentage(n) | Value::Code(n) | Value::Bitfield(n) => n,
            Value::Celsius(n) => n as u16,
        }
    }
}

impl std::fmt::Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match *self {
            Value::U16(n) | Value::Code(n) => f.write_fmt(format_args!("{}", n)),
            Value::Celsius(n) => f.write_fmt(format_args!("{}", n)),
            Value::Percentage(n) => f.write_fmt(format_args!("{}%", n)),
            Value::Bitfield(n) => f.write_fmt(format_args!("0x{:04X}", n)),
        }
    }
}

impl serde::Serialize for Value {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match *self {
            Value::U16(n) | Value::Percentage(n) | Value::Code(n) => serializer.serialize_u16(n),
            Value::Celsius(n) => serializer.serialize_i16(n),
            Value::Bitfield(n) => serializer.serialize_str(&format!("0x{:04X}", n)),
        }
    }
}

#[derive(Clone, Copy)]
#[repr(transparent)]
pub struct Mode(u8);

impl Mode {
    pub const R: Self = Self(1 << 0);
    pub const W: Self = Self(1 << 1);
    pub const RW: Self = Self(Self::R.0 | Self::W.0);
    const R_: Self = Self::R;

    pub const fn is_writable(&self) -> bool {
        self.0 & Self::W.0 != 0
    }
}

impl std::fmt::Display for Mode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(if self.0 & Self::R.0 == 0 { "-" } else { "R" })?;
        f.write_str(if self.0 & Self::W.0 == 0 { "-" } else { "W" })?;
        Ok(())
    }
}

impl serde::Serialize for Mode {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

macro_rules! for_each_register {
    ($m:ident) => {
        $m! {
            0x0000: U16, RW, "MACHINE_ADDRESS", "Modbus station address of this unit";
            0x0001: U16, R_, "SERIAL_NUMBER_1", "Factory serial number, word 1";
            0x0002: U16, R_, "SERIAL_NUMBER_2", "Factory serial number, word 2";
            0x0003: U16, R_, "SERIAL_NUMBER_3", "Factory serial number, word 3";
            0x0004: U16, RW, "MACHINE_ADDRESS_UPDATE", "Flag committing a station address change";
            0x0005: ENU, RW, "POWER", "Power state. 0=Off (factory default), 1=On";
            0x0006: ENU, RW, "FAN_SPEED_SETTING", "Airflow setting. 1, 2 or 3 select an airflow \
                level; level 1 is driven by the level-1 percentage registers";
            0x0007: PCT, RW, "SUPPLY_AIR_1_PCT", "Supply fan percentage for airflow level 1";
            0x0008: PCT, RW, "SUPPLY_AIR_2_PCT", "Supply fan percentage for airflow level 2";
            0x0009: PCT, RW, "SUPPLY_AIR_3_PCT", "Supply fan percentage for airflow level 3";
            0x000A: PCT, RW, "EXHAUST_AIR_1_PCT", "Exhaust fan percentage for airflow level 1";
            0x000B: PCT, RW, "EXHAUST_AIR_2_PCT", "Exhaust fan percentage for airflow level 2";
            0x000C: PCT, RW, "EXHAUST_AIR_3_PCT", "Exhaust fan percentage for airflow level 3";
            0x000D: U16, R_, "SUPPLY_FAN_RPM", "Measured supply fan speed in RPM";
            0x000E: U16, R_, "EXHAUST_FAN_RPM", "Measured exhaust fan speed in RPM";
            0x000F: ENU, RW, "BYPASS_FUNCTION", "Heat exchanger bypass. 0=Heat Exchange, \
                1=Bypass, 2=Auto (factory default)";
            0x0010: BIT, R_, "ABNORMAL_STATUS", "Fault bits. Bit3=EEPROM, Bit4=indoor return \
                temperature sensor, Bit5=outdoor temperature sensor, Bit6=exhaust fan, \
                Bit7=supply fan";
            0x0011: CEL, R_, "OUTDOOR_TEMP", "Outdoor air temperature in degrees Celsius";
            0x0012: CEL, R_, "INDOOR_RETURN_TEMP", "Indoor return air temperature in degrees \
                Celsius";
            0x0013: BIT, R_, "SYSTEM_STATUS", "Operating state bits. Bit0=running, Bit4=bypass \
                active, Bit5=internal circulation, Bit6=low temperature protection";
            0x0014: ENU, RW, "INTERNAL_CIRCULATION", "Air path selection. 0=Heat Exchange \
                (factory default), 1=Internal Circulation";
            0x0015: BIT, R_, "FAN_CONTROL_INPUT", "External input state. Bit0=low airflow, \
                Bit1=medium airflow, Bit2=high airflow, Bit3=internal circulation";
            0x0016: U16, RW, "RS485_CONTROL", "RS485 control configuration";
            0x0017: U16, R_, "SYSTEM_WEIGHT", "System weight";
            0x0018: U16, RW, "TEMP_DETECTION", "Temperature detection configuration";
        }
    };
}

macro_rules! make_tables {
    ($($addr:literal: $ty:ident, $mode:ident, $name:literal, $desc:literal;)*) => {
        pub const ADDRESSES: &[u16] = &[$($addr,)*];
        pub const DATA_TYPES: &[DataType] = &[$(DataType::$ty,)*];
        pub const MODES: &[Mode] = &[$(Mode::$mode,)*];
        pub const NAMES: &[&str] = &[$($name,)*];
        pub const DESCRIPTIONS: &[&str] = &[$($desc,)*];
    };
}
for_each_register!(make_tables);

/// Power register codes.
pub const POWER_OFF: u16 = 0x00;
pub const POWER_ON: u16 = 0x01;

/// The `FAN_SPEED_SETTING` code under which the device follows the level-1
/// percentage registers (`SUPPLY_AIR_1_PCT`/`EXHAUST_AIR_1_PCT`). Writing the
/// percentage registers has no effect until this level is selected.
pub const FAN_SPEED_PERCENTAGE_CONTROL: u16 = 0x01;

/// An index into the register table.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct RegisterIndex(usize);

impl RegisterIndex {
    pub const POWER: Self = Self::named(0x0005);
    pub const FAN_SPEED_SETTING: Self = Self::named(0x0006);
    pub const SUPPLY_AIR_1_PCT: Self = Self::named(0x0007);
    pub const EXHAUST_AIR_1_PCT: Self = Self::named(0x000A);
    pub const SUPPLY_FAN_RPM: Self = Self::named(0x000D);
    pub const EXHAUST_FAN_RPM: Self = Self::named(0x000E);
    pub const BYPASS_FUNCTION: Self = Self::named(0x000F);
    pub const ABNORMAL_STATUS: Self = Self::named(0x0010);
    pub const OUTDOOR_TEMP: Self = Self::named(0x0011);
    pub const INDOOR_RETURN_TEMP: Self = Self::named(0x0012);
    pub const SYSTEM_STATUS: Self = Self::named(0x0013);
    pub const INTERNAL_CIRCULATION: Self = Self::named(0x0014);

    pub const fn from_address(address: u16) -> Option<RegisterIndex> {
        let mut index = 0;
        while index < ADDRESSES.len() {
            if ADDRESSES[index] == address {
                return Some(Self(index));
            }
            index += 1;
        }
        None
    }

    pub fn from_name(name: &str) -> Option<RegisterIndex> {
        NAMES.iter().position(|v| *v == name).map(Self)
    }

    const fn named(address: u16) -> Self {
        match Self::from_address(address) {
            Some(register) => register,
            None => panic!("register address missing from the table"),
        }
    }

    pub const fn address(&self) -> u16 {
        ADDRESSES[self.0]
    }

    pub const fn name(&self) -> &'static str {
        NAMES[self.0]
    }

    pub const fn data_type(&self) -> DataType {
        DATA_TYPES[self.0]
    }

    pub const fn mode(&self) -> Mode {
        MODES[self.0]
    }

    pub const fn description(&self) -> &'static str {
        DESCRIPTIONS[self.0]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookups_agree() {
        for (index, &address) in ADDRESSES.iter().enumerate() {
            let register = RegisterIndex::from_address(address).unwrap();
            assert_eq!(register.address(), address);
            assert_eq!(RegisterIndex::from_name(NAMES[index]), Some(register));
        }
        assert!(RegisterIndex::from_address(0x0019).is_none());
        assert!(RegisterIndex::from_name("NOT_A_REGISTER").is_none());
    }

    #[test]
    fn temperature_words_are_twos_complement() {
        assert_eq!(DataType::CEL.from_word(0xFFF6), Value::Celsius(-10));
        assert_eq!(DataType::CEL.from_word(250), Value::Celsius(250));
        assert_eq!(Value::Celsius(-10).raw(), 0xFFF6);
    }

    #[test]
    fn bitfields_render_as_hex() {
        assert_eq!(DataType::BIT.from_word(0x00C8).to_string(), "0x00C8");
        assert_eq!(
            serde_json::to_string(&Value::Bitfield(0x00C8)).unwrap(),
            "\"0x00C8\""
        );
    }

    #[test]
    fn control_registers_are_writable() {
        for register in [
            RegisterIndex::POWER,
            RegisterIndex::FAN_SPEED_SETTING,
            RegisterIndex::SUPPLY_AIR_1_PCT,
            RegisterIndex::EXHAUST_AIR_1_PCT,
            RegisterIndex::BYPASS_FUNCTION,
            RegisterIndex::INTERNAL_CIRCULATION,
        ] {
            assert!(register.mode().is_writable(), "{}", register.name());
        }
        assert!(!RegisterIndex::SYSTEM_STATUS.mode().is_writable());
    }
}
