// Domain layer: consent models and the ports (DOM, cookies, event loop) the runtime is built on.

pub mod deferred;
pub mod model;
pub mod ports;
