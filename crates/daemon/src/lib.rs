pub mod http_server;
pub mod mount;
pub mod process;
pub mod supervisor;

pub use mount::{FilesystemDriver, MountError, MountPaths, Namespace, UnavailableDriver};
pub use process::{run, DaemonError, DaemonOptions};
pub use supervisor::{merge, supervise, ErrorSignal, MergedErrorSignal, ServiceError};
