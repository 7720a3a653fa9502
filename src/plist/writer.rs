//! Property-list XML writer.

use super::value::ConfigNode;

pub const XML_DECLARATION: &str = r#"<?xml version="1.0" encoding="UTF-8"?>"#;
pub const PLIST_DOCTYPE: &str = r#"<!DOCTYPE plist PUBLIC "-//Apple//DTD PLIST 1.0//EN" "http://www.apple.com/DTDs/PropertyList-1.0.dtd">"#;
pub const PLIST_OPEN: &str = r#"<plist version="1.0">"#;
pub const PLIST_CLOSE: &str = "</plist>";

/// Render a tree as a complete plist 1.0 document.
///
/// The match below is exhaustive over [`ConfigNode`]; a new variant will not
/// compile until it is given an XML form here.
pub fn serialize(tree: &ConfigNode) -> String {
    let mut out = String::with_capacity(4096);
    out.push_str(XML_DECLARATION);
    out.push('\n');
    out.push_str(PLIST_DOCTYPE);
    out.push('\n');
    out.push_str(PLIST_OPEN);
    out.push('\n');
    write_node(&mut out, tree, 0);
    out.push_str(PLIST_CLOSE);
    out.push('\n');
    out
}

fn indent(out: &mut String, depth: usize) {
    for _ in 0..depth {
        out.push('\t');
    }
}

/// Write one value. The caller has already indented the current line.
fn write_node(out: &mut String, node: &ConfigNode, depth: usize) {
    match node {
        ConfigNode::Dict(dict) if dict.is_empty() => out.push_str("<dict/>\n"),
        ConfigNode::Dict(dict) => {
            out.push_str("<dict>\n");
            for (key, value) in dict.iter() {
                indent(out, depth + 1);
                out.push_str("<key>");
                out.push_str(&escape(key));
                out.push_str("</key>\n");
                indent(out, depth + 1);
                write_node(out, value, depth + 1);
            }
            indent(out, depth);
            out.push_str("</dict>\n");
        }
        ConfigNode::List(items) if items.is_empty() => out.push_str("<array/>\n"),
        ConfigNode::List(items) => {
            out.push_str("<array>\n");
            for item in items {
                indent(out, depth + 1);
                write_node(out, item, depth + 1);
            }
            indent(out, depth);
            out.push_str("</array>\n");
        }
        ConfigNode::Bool(true) => out.push_str("<true/>\n"),
        ConfigNode::Bool(false) => out.push_str("<false/>\n"),
        ConfigNode::Integer(i) => {
            out.push_str(&format!("<integer>{}</integer>\n", i));
        }
        ConfigNode::Data(payload) => {
            out.push_str("<data>");
            out.push_str(payload);
            out.push_str("</data>\n");
        }
        ConfigNode::Date(at) => {
            out.push_str(&format!("<date>{}</date>\n", at.format("%Y-%m-%dT%H:%M:%SZ")));
        }
        ConfigNode::String(s) => {
            out.push_str("<string>");
            out.push_str(&escape(s));
            out.push_str("</string>\n");
        }
    }
}

/// Escape the five XML special characters. A carriage return is written as
/// `&#13;`, since a raw one reads back as `\n` after line-end normalization.
pub fn escape(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&apos;"),
            '\r' => escaped.push_str("&#13;"),
            _ => escaped.push(c),
        }
    }
    escaped
}
