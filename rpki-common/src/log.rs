// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use slog::{Drain, Logger};
use std::fs::OpenOptions;
use std::io::Write;

/// Size of the async drain channel. Sessions log every PDU at trace level
/// during a reset, so this needs to absorb bursts of a full VRP table.
const ASYNC_CHAN_SIZE: usize = 0x8000;

/// Bunyan formatted logger writing to stdout.
pub fn init_logger() -> Logger {
    build_logger(std::io::stdout())
}

/// Bunyan formatted logger appending to `filename`.
pub fn init_file_logger(filename: &str) -> std::io::Result<Logger> {
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(filename)?;
    Ok(build_logger(file))
}

pub fn build_logger<W: Write + Send + 'static>(w: W) -> Logger {
    let drain = slog_bunyan::new(w).build().fuse();
    let drain = slog_async::Async::new(drain)
        .chan_size(ASYNC_CHAN_SIZE)
        .build()
        .fuse();
    slog::Logger::root(drain, slog::o!())
}

/// Human readable logger for unit tests. Output goes through the test
/// harness capture so it only shows up for failing tests.
pub fn test_logger() -> Logger {
    let decorator =
        slog_term::PlainSyncDecorator::new(slog_term::TestStdoutWriter);
    let drain = slog_term::FullFormat::new(decorator).build().fuse();
    slog::Logger::root(drain, slog::o!())
}
