pub mod routes;
pub mod run;

pub use routes::{RoutesCommands, handle_routes_command};
pub use run::{RunCommands, Step, handle_run_command};
