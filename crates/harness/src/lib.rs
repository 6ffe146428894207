//! HILT Harness
//!
//! Orchestrates the processes of a hardware-in-the-loop test:
//! - Launches a controller, plain or under a restart supervisor
//! - Launches a device emulator and drives it through its backdoor
//! - Asserts on control points and emulator state by polling
//! - Checks how much a controller logged during a piece of test code
//! - Wraps flaky tests in fixtures, retries and skips
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      HarnessContext                         │
//! │    ├── run_dir/   <kind>-<name>-<mode>.log                  │
//! │    ├── scratch/   <name>.macros                             │
//! │    ├── controllers: ProcessRegistry                         │
//! │    └── emulators:   ProcessRegistry                         │
//! ├─────────────────────────────────────────────────────────────┤
//! │  EmulatorLauncher ──► emulator ◄── BackdoorChannel          │
//! │        │ port                          get / set / call     │
//! │        ▼                               disconnect/reconnect │
//! │  ControllerLauncher ──► controller ◄── ControlPointClient   │
//! │        │                               assert_point_*       │
//! │        └── LogTail ──► LogVolumeCheck                       │
//! └─────────────────────────────────────────────────────────────┘
//! ```

pub mod assertions;
pub mod backdoor;
pub mod context;
pub mod controller;
pub mod emulator;
pub mod log_volume;
pub mod process;
pub mod registry;
pub mod retry;

pub use assertions::ControlPointAssertions;
pub use backdoor::BackdoorChannel;
pub use context::HarnessContext;
pub use controller::{ControllerLauncher, LaunchVariant};
pub use emulator::{DisconnectedLink, EmulatorLauncher};
pub use log_volume::{LogVolumeCheck, NoiseFilter};
pub use process::{find_free_port, stop_all, ProcessHandle};
pub use registry::{ProcessRegistry, RegistryEntry};
pub use retry::{retrying, skip_if, skip_unless, with_fixture, Outcome, RetryPolicy};
