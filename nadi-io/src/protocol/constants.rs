//! Wire constants for the Kobuki-style serial protocol

// Header bytes
pub const HEADER_BYTE_1: u8 = 0xAA;
pub const HEADER_BYTE_2: u8 = 0x55;

// Frame layout: HEADER(2) + LEN(1) + PAYLOAD(LEN) + CS(1)
pub const HEADER_SIZE: usize = 3;
pub const CHECKSUM_SIZE: usize = 1;
pub const MIN_FRAME_SIZE: usize = HEADER_SIZE + CHECKSUM_SIZE;
pub const MAX_PAYLOAD_SIZE: usize = u8::MAX as usize;
pub const MAX_FRAME_SIZE: usize = HEADER_SIZE + MAX_PAYLOAD_SIZE + CHECKSUM_SIZE;
// Every feedback sub-payload the base can stream at once, headers included
pub const MAX_INBOUND_PAYLOAD: usize = 140;

// Sub-payload header: ID(1) + LEN(1)
pub const SUB_HEADER_SIZE: usize = 2;

// Inbound sub-payload IDs
pub const FEEDBACK_BASIC_SENSOR: u8 = 0x01; // Bumper, drops, cliffs, encoders, PWM, buttons, charger, battery
pub const FEEDBACK_DOCKING_IR: u8 = 0x03;
pub const FEEDBACK_INERTIAL: u8 = 0x04;
pub const FEEDBACK_CLIFF_ADC: u8 = 0x05;
pub const FEEDBACK_CURRENT: u8 = 0x06;
pub const FEEDBACK_RAW_GYRO: u8 = 0x0D;

// Inbound sub-payload sizes
pub const BASIC_SENSOR_SIZE: usize = 15;
pub const DOCKING_IR_SIZE: usize = 3;
pub const INERTIAL_SIZE: usize = 7;
pub const CLIFF_ADC_SIZE: usize = 6;
pub const CURRENT_SIZE: usize = 2;
pub const RAW_GYRO_HEADER_SIZE: usize = 2; // frame id + followed data length

// Basic sensor offsets (relative to sub-payload data)
pub const OFFSET_TIMESTAMP: usize = 0;
pub const OFFSET_BUMPER: usize = 2;
pub const OFFSET_WHEEL_DROP: usize = 3;
pub const OFFSET_CLIFF: usize = 4;
pub const OFFSET_LEFT_ENCODER: usize = 5;
pub const OFFSET_RIGHT_ENCODER: usize = 7;
pub const OFFSET_LEFT_PWM: usize = 9;
pub const OFFSET_RIGHT_PWM: usize = 10;
pub const OFFSET_BUTTONS: usize = 11;
pub const OFFSET_CHARGER: usize = 12;
pub const OFFSET_BATTERY: usize = 13;
pub const OFFSET_OVERCURRENT: usize = 14;

// Flag masks
pub const FLAG_RIGHT: u8 = 0x01;
pub const FLAG_CENTER: u8 = 0x02;
pub const FLAG_LEFT: u8 = 0x04;
pub const FLAG_DROP_RIGHT: u8 = 0x01;
pub const FLAG_DROP_LEFT: u8 = 0x02;
pub const FLAG_OVERCURRENT_LEFT: u8 = 0x01;
pub const FLAG_OVERCURRENT_RIGHT: u8 = 0x02;
pub const FLAG_BUTTON_0: u8 = 0x01;
pub const FLAG_BUTTON_1: u8 = 0x02;
pub const FLAG_BUTTON_2: u8 = 0x04;

// Outbound sub-payload IDs
pub const CMD_BASE_CONTROL: u8 = 0x01; // speed i16 mm/s, radius i16 mm
pub const CMD_SOUND: u8 = 0x03; // note u16, duration u8
pub const CMD_SOUND_SEQUENCE: u8 = 0x04; // preset u8

// Outbound sub-payload sizes
pub const BASE_CONTROL_SIZE: u8 = 4;
pub const SOUND_SIZE: u8 = 3;
pub const SOUND_SEQUENCE_SIZE: u8 = 1;

// Decoder ring capacity (must exceed MAX_FRAME_SIZE)
pub const DECODER_BUFFER_SIZE: usize = 1024;
