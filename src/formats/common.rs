use super::SNIFF_SIZE;
use bytes::Bytes;
use std::io;
use std::io::Read;

/// Reads a whole entry into memory, failing once more than `limit` bytes
/// are produced.
pub fn read_entry(reader: impl Read, limit: Option<u64>) -> io::Result<Bytes> {
    let mut buffer = Vec::new();
    match limit {
        None => {
            let mut reader = reader;
            reader.read_to_end(&mut buffer)?;
        }
        Some(limit) => {
            reader.take(limit.saturating_add(1)).read_to_end(&mut buffer)?;
            if buffer.len() as u64 > limit {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!("entry is larger than the {limit} byte limit"),
                ));
            }
        }
    }
    Ok(Bytes::from(buffer))
}

/// Joins a member name onto the composite path of its container. Backslashes
/// become `/`, empty and `.` components are dropped.
pub fn composite_path(prefix: &str, name: &str) -> String {
    let name = name.replace('\\', "/");
    let mut path = String::with_capacity(prefix.len() + name.len() + 1);
    path.push_str(prefix);
    for component in name.split('/') {
        if component.is_empty() || component == "." {
            continue;
        }
        if !path.is_empty() {
            path.push('/');
        }
        path.push_str(component);
    }
    path
}

/// Reads at most `SNIFF_SIZE` bytes from the start of an entry. The caller
/// replays them in front of the rest of the stream.
pub fn peek_head(reader: &mut dyn Read) -> io::Result<Vec<u8>> {
    let mut head = Vec::with_capacity(SNIFF_SIZE);
    reader.take(SNIFF_SIZE as u64).read_to_end(&mut head)?;
    Ok(head)
}
