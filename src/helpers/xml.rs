//! Event-level XML reading for the XLSX and ODS readers: a reusable-buffer
//! reader, attribute lookup on start tags, and text accumulation that
//! resolves entity and character references.

use crate::error::RustyChunkerError;
use quick_xml::escape::resolve_xml_entity;
use quick_xml::events::BytesRef;
use quick_xml::events::BytesStart;
use quick_xml::events::BytesText;
use quick_xml::events::Event;
use quick_xml::Reader;
use std::borrow::Cow;
use std::io::BufRead;
use std::str::FromStr;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum XmlError {
    #[error("Parse entity '{0}' failed")]
    ParseEntityError(String),

    #[error("Parse attribute {0}='{1}' failed")]
    ParseAttributeValueError(String, String),
}

/// Pull reader over one archive part. Empty elements are expanded so that
/// every start tag has a matching end event.
pub(crate) struct XmlReader<R: BufRead> {
    reader: Reader<R>,
    buffer: Vec<u8>,
}

impl<R: BufRead> XmlReader<R> {
    pub(crate) fn new(buf_reader: R) -> XmlReader<R> {
        let mut reader = Reader::from_reader(buf_reader);
        let config = reader.config_mut();
        config.check_comments = false;
        config.check_end_names = false;
        config.expand_empty_elements = true;
        config.trim_text(false);

        let buffer = Vec::with_capacity(1024);
        XmlReader { reader, buffer }
    }

    /// Next event, or `None` at the end of the document
    pub(crate) fn next(&'_ mut self) -> Result<Option<Event<'_>>, RustyChunkerError> {
        self.buffer.clear();
        match self.reader.read_event_into(&mut self.buffer) {
            Ok(Event::Eof) => Ok(None),
            Ok(event) => Ok(Some(event)),
            Err(error) => Err(RustyChunkerError::XmlError(error)),
        }
    }
}

/// Attribute lookup on start tags. Values are unescaped; missing attributes are `None`.
pub(crate) trait XmlNodeHelper<'a> {
    /// Gets an attribute value by its qualified name, e.g. `table:name`
    fn get_attribute_value(&'a self, name: &str) -> Result<Option<Cow<'a, str>>, RustyChunkerError>;

    /// Gets an attribute value by its local name, whatever namespace prefix the writer chose
    fn get_local_attribute_value(&'a self, local_name: &str) -> Result<Option<Cow<'a, str>>, RustyChunkerError>;

    /// Parses an attribute value, failing when it is present but malformed
    fn parse_attribute_value<T: FromStr>(&'a self, name: &str) -> Result<Option<T>, RustyChunkerError>;
}

impl<'a> XmlNodeHelper<'a> for BytesStart<'a> {
    fn get_attribute_value(&'a self, name: &str) -> Result<Option<Cow<'a, str>>, RustyChunkerError> {
        match self.try_get_attribute(name)? {
            Some(attribute) => Ok(Some(attribute.unescape_value()?)),
            None => Ok(None),
        }
    }

    fn get_local_attribute_value(&'a self, local_name: &str) -> Result<Option<Cow<'a, str>>, RustyChunkerError> {
        for result in self.attributes() {
            let attribute = result?;
            if attribute.key.local_name().as_ref() == local_name.as_bytes() {
                return Ok(Some(attribute.unescape_value()?));
            }
        }
        Ok(None)
    }

    fn parse_attribute_value<T: FromStr>(&'a self, name: &str) -> Result<Option<T>, RustyChunkerError> {
        match self.get_attribute_value(name)? {
            Some(value) => value
                .trim()
                .parse()
                .map(Some)
                .map_err(|_| XmlError::ParseAttributeValueError(name.to_owned(), value.to_string()).into()),
            None => Ok(None),
        }
    }
}

/// Accumulates cell text from `Text` and `GeneralRef` events.
pub(crate) trait XmlTextHelper {
    fn push_text(&mut self, text: &BytesText) -> Result<(), RustyChunkerError>;

    /// Appends a predefined entity (`&amp;`) or a character reference
    /// (`&#65;`, `&#x41;`). Out-of-range code points become U+FFFD.
    fn push_reference(&mut self, reference: &BytesRef) -> Result<(), RustyChunkerError>;
}

impl XmlTextHelper for String {
    fn push_text(&mut self, text: &BytesText) -> Result<(), RustyChunkerError> {
        self.push_str(&text.xml_content()?);
        Ok(())
    }

    fn push_reference(&mut self, reference: &BytesRef) -> Result<(), RustyChunkerError> {
        let name = reference.xml_content()?;
        if let Some(entity) = resolve_xml_entity(&name) {
            self.push_str(entity);
            return Ok(());
        }
        let code = name.strip_prefix('#').and_then(|number| match number.strip_prefix('x') {
            Some(hex) => u32::from_str_radix(hex, 16).ok(),
            None => number.parse::<u32>().ok(),
        });
        match code {
            Some(code) => self.push(char::from_u32(code).unwrap_or(char::REPLACEMENT_CHARACTER)),
            None => Err(XmlError::ParseEntityError(name.to_string()))?,
        }
        Ok(())
    }
}

/// Loops over the events of an [`XmlReader`] until the end of the document.
/// Unmatched events are skipped.
#[macro_export]
macro_rules! match_xml_events {
    ($reader:expr => { $($arms:tt)* }) => {
        while let Some(result) = $reader.next()? {
            match result {
                Event::Eof => break,
                $($arms)*
                _ => (),
            }
        }
    };
}
