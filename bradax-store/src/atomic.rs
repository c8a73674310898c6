use std::io::Write;
use std::path::Path;

/// Atomically replace `path` with `bytes`.
///
/// Writes to a sibling temp file on the same filesystem, fsyncs, then
/// renames over the target, so concurrent readers always observe either
/// the old contents fully or the new contents fully.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let tmp = path.with_extension("json.tmp");
    {
        let mut file = std::fs::File::create(&tmp)?;
        file.write_all(bytes)?;
        file.sync_all()?;
    }
    std::fs::rename(&tmp, path)
}
