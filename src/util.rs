use std::io::{Error, ErrorKind, Read, Result};

/// Fills `buf` from `reader`, retrying on EINTR and short reads.
///
/// Unlike [`Read::read_exact()`] this tells a "clean" EOF, where the stream ends
/// before any byte was read, apart from a truncated read:
///
///  - `Ok(true)` when the buffer was filled
///  - `Ok(false)` on a clean EOF
///  - an error of kind [`ErrorKind::UnexpectedEof`] when the stream ended part way
///    through the buffer
///  - any other error from the reader, unchanged
///
/// Archive readers use this at record boundaries, where a clean EOF may end the
/// archive but a partial record never can.
pub(crate) fn read_exactish(reader: &mut impl Read, buf: &mut [u8]) -> Result<bool> {
    let buflen = buf.len();
    let mut todo: &mut [u8] = buf;

    while !todo.is_empty() {
        match reader.read(todo) {
            Ok(0) => {
                return match todo.len() {
                    s if s == buflen => Ok(false), // clean EOF
                    _ => Err(Error::from(ErrorKind::UnexpectedEof)),
                };
            }
            Ok(n) => todo = &mut todo[n..],
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }

    Ok(true)
}
