// Hardware access for the drivetrain
//
// Provides:
// - Serial actuator bus protocol (drive/steer controllers, encoders, IMU)
// - ModuleIo / HeadingSensor capabilities with bus and simulation backends

pub mod bus;
pub mod io;

pub use bus::{ActuatorBus, BusError};
pub use io::{
    BusHeadingSensor, BusModuleIo, HeadingSensor, ModuleIo, SharedBus, SimHeadingSensor,
    SimModuleIo,
};
