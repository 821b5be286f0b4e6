//! State machines driving the device link (C1) and the recorder (C6).

pub mod device_link;
pub mod recorder;

pub use device_link::{
    DeviceLinkContext, DeviceLinkEvent, DeviceLinkRunner, DeviceLinkState, DeviceLinkStateMachine,
};
pub use recorder::{RecorderEvent, RecorderRunner, RecorderState};
