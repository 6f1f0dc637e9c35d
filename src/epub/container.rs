//! OCF container entry point: `META-INF/container.xml`.

use quick_xml::events::Event;
use quick_xml::Reader;

use crate::error::{Error, Result};

use super::local_name;

/// Collect the `full-path` attribute of every
/// `<rootfiles>/<rootfile>` entry, in document order.
pub fn rootfile_paths(content: &[u8]) -> Result<Vec<String>> {
    let mut reader = Reader::from_reader(content);
    reader.config_mut().trim_text(true);

    let mut paths = Vec::new();
    loop {
        match reader.read_event() {
            Ok(Event::Empty(e)) | Ok(Event::Start(e))
                if local_name(e.name().as_ref()) == b"rootfile" =>
            {
                for attr in e.attributes().flatten() {
                    if attr.key.as_ref() == b"full-path" {
                        paths.push(String::from_utf8(attr.value.to_vec())?);
                    }
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(Error::Xml(e)),
            _ => {}
        }
    }
    Ok(paths)
}
