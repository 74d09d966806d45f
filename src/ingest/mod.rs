/// Acquisition of raw forecast payloads.
///
/// Submodules:
/// - `nwm` — URL construction, the HTTP transport and the per-request
///   cached fetcher for the National Water Model data service.
/// - `fixtures` — bundled example responses for offline use.

pub mod fixtures;
pub mod nwm;
