//! Well-known Bluetooth SIG UUIDs, handy for embedders addressing
//! standard services without spelling out the base UUID.

use uuid::Uuid;

/// Standard Bluetooth service UUIDs
pub const UUID_GENERIC_ACCESS_SERVICE: Uuid =
    Uuid::from_u128(0x00001800_0000_1000_8000_00805f9b34fb);
pub const UUID_DEVICE_INFORMATION_SERVICE: Uuid =
    Uuid::from_u128(0x0000180a_0000_1000_8000_00805f9b34fb);
pub const UUID_BATTERY_SERVICE: Uuid = Uuid::from_u128(0x0000180f_0000_1000_8000_00805f9b34fb);

/// Standard Bluetooth characteristic UUIDs
pub const UUID_DEVICE_NAME: Uuid = Uuid::from_u128(0x00002a00_0000_1000_8000_00805f9b34fb);
pub const UUID_MANUFACTURER_NAME: Uuid = Uuid::from_u128(0x00002a29_0000_1000_8000_00805f9b34fb);
pub const UUID_MODEL_NUMBER: Uuid = Uuid::from_u128(0x00002a24_0000_1000_8000_00805f9b34fb);
pub const UUID_BATTERY_LEVEL: Uuid = Uuid::from_u128(0x00002a19_0000_1000_8000_00805f9b34fb);
