//! Register maps of the SunSpec models exposed by SolarEdge inverters.
//!
//! Layouts follow the SolarEdge "SunSpec implementation technical note"
//! for the SE5000H and similar single phase inverters.
use crate::decoder::DecoderKind::{Enum, Str, I16, U16, U32};
use crate::error::Result;
use crate::mapping::{Entry, RegisterMap};
use crate::value::EnumTable;

/// Value of `C_SunSpec_ID`: "SunS" in ASCII.
pub const SUNSPEC_ID: u32 = 0x5375_6e53;

/// Operating state of a SunSpec inverter (`I_Status`).
pub static INVERTER_STATUS: EnumTable = EnumTable {
    name: "inverter status",
    codes: &[
        (1, "I_STATUS_OFF"),
        // Night mode
        (2, "I_STATUS_SLEEPING"),
        // Grid monitoring / wake-up
        (3, "I_STATUS_STARTING"),
        (4, "I_STATUS_MPPT"),
        // Curtailed production
        (5, "I_STATUS_THROTTLED"),
        (6, "I_STATUS_SHUTTING_DOWN"),
        (7, "I_STATUS_FAULT"),
        // Maintenance / setup
        (8, "I_STATUS_STANDBY"),
    ],
};

/// Common model (SunSpec model 1): identity of the device.
pub static COMMON_MODEL: RegisterMap = RegisterMap::new(
    "common",
    &[
        Entry::field(40000, "C_SunSpec_ID", U32),
        Entry::field(40002, "C_SunSpec_DID", U16),
        // 65 registers follow, the model ends at 40003 + 1 + 65 = 40069
        Entry::field(40003, "C_SunSpec_Length", U16),
        Entry::field(40004, "C_Manufacturer", Str(32)),
        Entry::field(40020, "C_Model", Str(32)),
        Entry::field(40044, "C_Version", Str(16)),
        Entry::field(40052, "C_SerialNumber", Str(32)),
        Entry::field(40068, "C_DeviceAddress", U16),
        Entry::end(40069),
    ],
);

/// Inverter model (SunSpec model 101 for single phase, 102 split, 103 three phase).
pub static INVERTER_MODEL: RegisterMap = RegisterMap::new(
    "inverter",
    &[
        Entry::field(40069, "C_SunSpec_DID", U16),
        // 50 registers follow, the model ends at 40070 + 1 + 50 = 40121
        Entry::field(40070, "C_SunSpec_Length", U16),
        Entry::with_unit(40083, "I_AC_Power", U16, "W"),
        Entry::field(40084, "I_AC_Power_SF", I16),
        Entry::with_unit(40085, "I_AC_Frequency", U16, "Hz"),
        Entry::field(40086, "I_AC_Frequency_SF", I16),
        Entry::with_unit(40093, "I_AC_Energy_WH", U32, "Wh"),
        Entry::field(40095, "I_AC_Energy_WH_SF", I16),
        Entry::with_unit(40100, "I_DC_Power", U16, "W"),
        Entry::field(40101, "I_DC_Power_SF", I16),
        Entry::with_unit(40103, "I_Temp_Sink", I16, "°C"),
        Entry::field(40106, "I_Temp_Sink_SF", I16),
        Entry::field(40107, "I_Status", Enum(&INVERTER_STATUS)),
        Entry::field(40108, "I_Status_Vendor", U16),
        Entry::end(40121),
    ],
);

/// Only the AC power of the inverter model, for cheap frequent polling.
pub static AC_POWER_MODEL: RegisterMap = RegisterMap::new(
    "ac_power",
    &[
        Entry::with_unit(40083, "I_AC_Power", U16, "W"),
        Entry::field(40084, "I_AC_Power_SF", I16),
        Entry::end(40085),
    ],
);

/// Every built-in map.
pub static BUILTIN_MAPS: [&RegisterMap; 3] = [&COMMON_MODEL, &INVERTER_MODEL, &AC_POWER_MODEL];

/// Validates all built-in maps. Meant to run once at start-up.
pub fn validate_builtin_maps() -> Result<()> {
    for map in BUILTIN_MAPS {
        map.validate()?;
        log::trace!("Register map '{}' is valid", map.name);
    }
    Ok(())
}
