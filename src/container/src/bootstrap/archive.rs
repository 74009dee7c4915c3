/// Single-file tar archives for copying generated files into containers
use std::path::Path;
use tar::{Builder, EntryType, Header};

/// Build an uncompressed tar holding one regular file `name` with `content`
pub fn single_file(name: &str, content: &[u8], mode: u32) -> std::io::Result<Vec<u8>> {
    let mut header = Header::new_gnu();
    header.set_entry_type(EntryType::Regular);
    header.set_size(content.len() as u64);
    header.set_mode(mode);
    header.set_mtime(0);
    header.set_uid(0);
    header.set_gid(0);

    let mut builder = Builder::new(Vec::new());
    builder.append_data(&mut header, Path::new(name), content)?;
    builder.into_inner()
}
