//! Service announcement for ref advertisement responses.
//!
//! Smart HTTP clients expect the `info/refs` response to open with a
//! `# service=<name>` pkt-line and a flush packet before the refs that the
//! pack process itself advertises.

use crate::pktline::PktLine;
use crate::service::PackService;
use crate::Result;
use bytes::Bytes;

/// Encodes the announcement that precedes a ref advertisement.
///
/// For `git-upload-pack` this is `001e# service=git-upload-pack\n0000`.
pub fn encode_advertisement(service: PackService) -> Result<Bytes> {
    let line = format!("# service={}\n", service.name());
    let mut out = PktLine::data(line)?.encode();
    out.extend_from_slice(&PktLine::Flush.encode());
    Ok(Bytes::from(out))
}
