pub mod handlers;
pub mod routes;
pub mod server;

pub use routes::create_router;
pub use server::serve;
