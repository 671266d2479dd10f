// Adapters layer: headless implementations of the runtime ports, used by the CLI and the tests.

pub mod manual_loop;
pub mod memory_cookies;
pub mod memory_dom;

pub use manual_loop::ManualEventLoop;
pub use memory_cookies::MemoryCookieJar;
pub use memory_dom::MemoryDom;
