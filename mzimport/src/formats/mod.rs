//! The readers for the search engine result formats
mod mascot;
mod omssa;
mod xtandem;

pub use mascot::*;
pub use omssa::*;
pub use xtandem::*;

use std::path::Path;

use roxmltree::{Document, Node, ParsingOptions};

use crate::ImportError;

/// Parse an XML document and check the name of the root element
fn parse_xml<'input>(
    path: &Path,
    text: &'input str,
    root: &str,
) -> Result<Document<'input>, ImportError> {
    let document = Document::parse_with_options(
        text,
        ParsingOptions {
            allow_dtd: true,
            ..Default::default()
        },
    )
    .map_err(|err| ImportError::malformed(path, None, format!("Invalid XML: {err}")))?;
    let name = document.root_element().tag_name().name();
    if name == root {
        Ok(document)
    } else {
        Err(ImportError::malformed(
            path,
            None,
            format!("The root element is '{name}' while '{root}' was expected"),
        ))
    }
}

/// The first child element with the given tag name
fn child<'a, 'input>(node: Node<'a, 'input>, name: &str) -> Option<Node<'a, 'input>> {
    node.children()
        .find(|n| n.is_element() && n.tag_name().name() == name)
}

/// All child elements with the given tag name
fn children<'a, 'input: 'a>(
    node: Node<'a, 'input>,
    name: &'a str,
) -> impl Iterator<Item = Node<'a, 'input>> + 'a {
    node.children()
        .filter(move |n| n.is_element() && n.tag_name().name() == name)
}

/// The trimmed text of the first descendant element with the given tag name
fn descendant_text(node: Node<'_, '_>, name: &str) -> Option<String> {
    node.descendants()
        .find(|n| n.is_element() && n.tag_name().name() == name)
        .and_then(|n| n.text())
        .map(|t| t.trim().to_string())
}

/// Read any source into a string, reporting errors against the given path
fn read_source(mut reader: impl std::io::Read, path: &Path) -> Result<String, ImportError> {
    let mut text = String::new();
    reader
        .read_to_string(&mut text)
        .map_err(|source| ImportError::Io {
            path: path.to_path_buf(),
            source,
        })?;
    Ok(text)
}
