pub mod sim_chip;
pub mod utils;

pub mod prelude {
    pub use super::sim_chip::{encode_rx_buffer, SimChip};
    pub use super::utils::{
        default_config, init_logging, BoardLog, Harness, RecordingQueue, RecordingSink,
        StepClock, TIMING_500K,
    };
    pub use mcpcan_common::{
        CanFrame, CanId, ControlMode, ControllerState, DriverConfig, ErrorFlags, InterruptFlags,
    };
    pub use mcpcan_driver::{Callbacks, CanMode, DriverError, GateSnapshot, Mcp2515, Step};
}
