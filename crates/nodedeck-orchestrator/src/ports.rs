//! Random port allocation

use nodedeck_core::{Error, PortRange, Result};
use rand::Rng;
use std::collections::HashSet;

/// Draw a port uniformly from `range`, skipping the panel's own port and
/// every port in `taken`. Gives up after `attempts` draws.
///
/// Two concurrent callers may draw the same port; the store's unique
/// constraint or the start-time bind probe catches that.
pub fn allocate_port<R: Rng + ?Sized>(
    rng: &mut R,
    range: &PortRange,
    panel_port: u16,
    taken: &HashSet<u16>,
    attempts: u32,
) -> Result<u16> {
    let exhausted = Error::PortRangeExhausted {
        start: range.start,
        end: range.end,
    };
    if range.is_empty() {
        return Err(exhausted);
    }

    for _ in 0..attempts.max(1) {
        let port = rng.gen_range(range.start..=range.end);
        if port != panel_port && !taken.contains(&port) {
            return Ok(port);
        }
    }
    Err(exhausted)
}
