//! Result reporting
//!
//! Items coming out of a run are printed through a fallback chain: a
//! mapping is pretty-printed as is; otherwise the item's attribute map is
//! pretty-printed; otherwise its `Display` form is written.

use serde_json::{Map, Value};
use std::fmt;
use std::io::{self, Write};

use crate::error::Result;
use crate::event::Event;

/// How an item was rendered
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rendering {
    Mapping,
    Attributes,
    Text,
}

/// Something that can be reported after a run
pub trait Reportable: fmt::Display {
    /// The item itself, when it already is a mapping
    fn as_mapping(&self) -> Option<&Map<String, Value>> {
        None
    }

    /// The item's attributes, when it exposes any
    ///
    /// Only an object value counts as an attribute map; anything else, or
    /// an error, falls through to the `Display` form.
    fn attributes(&self) -> Option<serde_json::Result<Value>> {
        None
    }
}

impl Reportable for Event {
    fn attributes(&self) -> Option<serde_json::Result<Value>> {
        Some(serde_json::to_value(self))
    }
}

impl Reportable for Value {
    fn as_mapping(&self) -> Option<&Map<String, Value>> {
        self.as_object()
    }
}

impl Reportable for String {}

impl Reportable for &str {}

impl<T: Reportable + ?Sized> Reportable for Box<T> {
    fn as_mapping(&self) -> Option<&Map<String, Value>> {
        (**self).as_mapping()
    }

    fn attributes(&self) -> Option<serde_json::Result<Value>> {
        (**self).attributes()
    }
}

/// Write one item using the first branch of the fallback chain that applies
pub fn render_item<W, T>(out: &mut W, item: &T) -> io::Result<Rendering>
where
    W: Write + ?Sized,
    T: Reportable + ?Sized,
{
    if let Some(map) = item.as_mapping() {
        let text = serde_json::to_string_pretty(map).map_err(io::Error::from)?;
        writeln!(out, "{}", text)?;
        return Ok(Rendering::Mapping);
    }

    if let Some(Ok(attributes @ Value::Object(_))) = item.attributes() {
        if let Ok(text) = serde_json::to_string_pretty(&attributes) {
            writeln!(out, "{}", text)?;
            return Ok(Rendering::Attributes);
        }
    }

    writeln!(out, "{}", item)?;
    Ok(Rendering::Text)
}

/// Render every item in order
///
/// The first error produced by the iteration itself is returned as is;
/// items before it have already been written.
pub fn report_all<I, T, W>(items: I, out: &mut W) -> Result<Vec<Rendering>>
where
    I: IntoIterator<Item = Result<T>>,
    T: Reportable,
    W: Write + ?Sized,
{
    let mut renderings = Vec::new();
    for item in items {
        let item = item?;
        renderings.push(render_item(out, &item)?);
    }
    out.flush()?;
    Ok(renderings)
}
