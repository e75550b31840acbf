// Training process management
pub mod supervisor;

pub use supervisor::JobSupervisor;
