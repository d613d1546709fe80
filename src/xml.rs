// 🧾 XML Element Streams - lazy decoding of the article and price files
//
// Both files are long flat lists of <item> elements. XmlStream walks the
// document with quick-xml, collects the text of one <item> subtree at a time
// into an Element (path -> text) and converts it into a typed entry.
// Nothing beyond the current element is ever held in memory.

use quick_xml::events::Event;
use quick_xml::Reader;
use std::collections::HashMap;
use std::io::BufRead;
use std::marker::PhantomData;

use crate::error::{ImportError, Result};
use crate::join::{ArticleEntry, PriceEntry};

/// Tag that wraps one article / one price
pub const ITEM_TAG: &str = "item";

// ============================================================================
// ELEMENT
// ============================================================================

/// Element - text content of one item, keyed by child path (`price>EXPR`)
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Element {
    fields: HashMap<String, String>,
}

impl Element {
    pub fn get(&self, path: &str) -> Option<&str> {
        self.fields.get(path).map(|s| s.trim())
    }

    fn push_text(&mut self, path: &[String], text: &str) {
        if path.is_empty() {
            return;
        }
        self.fields.entry(path.join(">")).or_default().push_str(text);
    }

    fn touch(&mut self, path: &[String]) {
        if !path.is_empty() {
            self.fields.entry(path.join(">")).or_default();
        }
    }
}

/// Conversion from a decoded element into a typed stream entry
pub trait FromElement: Sized {
    /// Stream name used in error messages
    const STREAM: &'static str;

    fn from_element(element: &Element) -> std::result::Result<Self, String>;
}

impl FromElement for ArticleEntry {
    const STREAM: &'static str = "article";

    fn from_element(element: &Element) -> std::result::Result<Self, String> {
        let id = required_id(element)?;
        Ok(ArticleEntry {
            id,
            description: element.get("part_description>DESC").unwrap_or("").to_string(),
            manufacturer: element.get("additional_information>MAFT").unwrap_or("").to_string(),
            category: element.get("part_catagory>CAT1").unwrap_or("").to_string(),
        })
    }
}

impl FromElement for PriceEntry {
    const STREAM: &'static str = "price";

    fn from_element(element: &Element) -> std::result::Result<Self, String> {
        let id = required_id(element)?;
        let raw = element
            .get("price>EXPR")
            .ok_or_else(|| format!("item {} has no price>EXPR", id))?;
        let purchase_price: f64 = raw
            .parse()
            .map_err(|_| format!("item {} has an invalid price '{}'", id, raw))?;
        if !purchase_price.is_finite() || purchase_price < 0.0 {
            return Err(format!("item {} has a negative price '{}'", id, raw));
        }
        Ok(PriceEntry { id, purchase_price })
    }
}

fn required_id(element: &Element) -> std::result::Result<String, String> {
    match element.get("LITM") {
        Some(id) if !id.is_empty() => Ok(id.to_string()),
        _ => Err("item without LITM".to_string()),
    }
}

fn decode_error(stream: &'static str, position: u64, message: String) -> ImportError {
    ImportError::Decode {
        stream,
        position,
        message,
    }
}

// ============================================================================
// XML STREAM
// ============================================================================

/// XmlStream - forward-only iterator of typed entries from an XML reader
///
/// Yields `Err(ImportError::Decode)` for malformed XML or an item that does
/// not convert; after an error the stream is finished.
pub struct XmlStream<R, T> {
    reader: Reader<R>,
    buf: Vec<u8>,
    finished: bool,
    _entry: PhantomData<T>,
}

pub type ArticleStream<R> = XmlStream<R, ArticleEntry>;
pub type PriceStream<R> = XmlStream<R, PriceEntry>;

impl<R: BufRead, T: FromElement> XmlStream<R, T> {
    pub fn new(input: R) -> Self {
        let mut reader = Reader::from_reader(input);
        reader.config_mut().trim_text(true);
        XmlStream {
            reader,
            buf: Vec::new(),
            finished: false,
            _entry: PhantomData,
        }
    }

    fn error(&self, message: String) -> ImportError {
        decode_error(T::STREAM, self.reader.buffer_position() as u64, message)
    }

    /// Skip ahead to the next <item> and collect it
    fn next_element(&mut self) -> Result<Option<Element>> {
        loop {
            self.buf.clear();
            let found = match self.reader.read_event_into(&mut self.buf) {
                Ok(Event::Start(start)) => start.local_name().as_ref() == ITEM_TAG.as_bytes(),
                Ok(Event::Empty(empty)) => {
                    if empty.local_name().as_ref() == ITEM_TAG.as_bytes() {
                        return Ok(Some(Element::default()));
                    }
                    false
                }
                Ok(Event::Eof) => return Ok(None),
                Ok(_) => false,
                Err(err) => {
                    let position = self.reader.buffer_position() as u64;
                    return Err(decode_error(T::STREAM, position, err.to_string()));
                }
            };
            if found {
                return self.read_item().map(Some);
            }
        }
    }

    /// Collect the subtree of the <item> that was just opened
    fn read_item(&mut self) -> Result<Element> {
        let mut element = Element::default();
        let mut path: Vec<String> = Vec::new();

        loop {
            self.buf.clear();
            let event = match self.reader.read_event_into(&mut self.buf) {
                Ok(event) => event,
                Err(err) => {
                    let position = self.reader.buffer_position() as u64;
                    return Err(decode_error(T::STREAM, position, err.to_string()));
                }
            };
            let position = self.reader.buffer_position() as u64;
            match event {
                Event::Start(start) => {
                    path.push(String::from_utf8_lossy(start.local_name().as_ref()).into_owned());
                }
                Event::Empty(empty) => {
                    path.push(String::from_utf8_lossy(empty.local_name().as_ref()).into_owned());
                    element.touch(&path);
                    path.pop();
                }
                Event::Text(text) => {
                    let text = match text.unescape() {
                        Ok(text) => text.into_owned(),
                        Err(err) => return Err(decode_error(T::STREAM, position, err.to_string())),
                    };
                    element.push_text(&path, &text);
                }
                Event::CData(data) => {
                    let text = match self.reader.decoder().decode(&data) {
                        Ok(text) => text.into_owned(),
                        Err(err) => return Err(decode_error(T::STREAM, position, err.to_string())),
                    };
                    element.push_text(&path, &text);
                }
                Event::End(_) => {
                    if path.pop().is_none() {
                        return Ok(element);
                    }
                }
                Event::Eof => {
                    let message = format!("unexpected end of file inside <{}>", ITEM_TAG);
                    return Err(decode_error(T::STREAM, position, message));
                }
                _ => {}
            }
        }
    }
}

impl<R: BufRead, T: FromElement> Iterator for XmlStream<R, T> {
    type Item = Result<T>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }
        let result = match self.next_element() {
            Ok(Some(element)) => T::from_element(&element).map_err(|message| self.error(message)),
            Ok(None) => {
                self.finished = true;
                return None;
            }
            Err(err) => Err(err),
        };
        if result.is_err() {
            self.finished = true;
        }
        Some(result)
    }
}

// ============================================================================
// TESTS
// ============================================================================
