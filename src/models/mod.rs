pub mod event;
pub mod proxy;
pub mod resource;
pub mod session;
pub mod status;

pub use event::*;
pub use proxy::*;
pub use resource::*;
pub use session::*;
pub use status::*;
