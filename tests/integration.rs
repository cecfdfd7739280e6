#[path = "integration/support.rs"]
mod support;

#[path = "integration/loader.rs"]
mod loader;
#[path = "integration/node.rs"]
mod node;
#[path = "integration/session.rs"]
mod session;
#[path = "integration/source_maps.rs"]
mod source_maps;
