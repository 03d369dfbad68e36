//! Shared helpers for the integration tests

#![allow(dead_code)]

use spichan::{SpiChannels, SpiChannelsConfig};
use spichan_dummy::DummyTransport;

/// Install a test logger once per test binary
pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Controller over an emulator that has both default nodes
pub fn dummy_channels() -> SpiChannels<DummyTransport> {
    init_logging();
    SpiChannels::new(DummyTransport::new())
}

/// Controller over `transport` with an explicit configuration
pub fn dummy_channels_with(
    transport: DummyTransport,
    config: SpiChannelsConfig,
) -> SpiChannels<DummyTransport> {
    init_logging();
    SpiChannels::with_config(transport, config)
}
