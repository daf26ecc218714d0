//! Reads a KDL document as JSON, so that `serde` can take it from there.
//!
//! The rules:
//!
//! - A document is an object. Each node is a property, named by the node,
//!   whose value is the node's argument.
//! - A document whose nodes are all named `-` is an array instead.
//! - A node with a `{...}` body takes the body (read as a document) as its
//!   value.
//! - A node with several arguments is an array; a node with only `key=value`
//!   properties is an object.
//!
//! Anything that could be read more than one way is an error: bodies plus
//! arguments, arguments plus properties, `-` mixed with named nodes, or the
//! same key twice.
//!
//! ```kdl
//! serial {
//!     baud-rate 9600
//!     greeting "hello\r\n"
//! }
//! pins {
//!     rx name="A3" af=1
//! }
//! ```
//!
//! reads as
//!
//! ```json
//! {
//!     "serial": { "baud-rate": 9600, "greeting": "hello\r\n" },
//!     "pins": { "rx": { "name": "A3", "af": 1 } }
//! }
//! ```

use kdl::{KdlDocument, KdlNode, KdlValue};
use miette::{bail, LabeledSpan};
use serde_json::{Map, Value};

/// Interprets `doc` as a JSON object or array.
pub fn doc_to_json(doc: &KdlDocument) -> miette::Result<Value> {
    let nodes = doc.nodes();
    let dashes = nodes.iter().filter(|n| is_array_element(n)).count();

    if dashes == 0 {
        let mut map = Map::new();
        for node in nodes {
            let key = node.name().value();
            if let Some(first) = nodes.iter().find(|n| n.name().value() == key) {
                if !std::ptr::eq(first, node) {
                    bail!(
                        labels = [
                            LabeledSpan::at(*first.span(), "first here"),
                            LabeledSpan::at(*node.span(), "again here"),
                        ],
                        "duplicate key `{key}`"
                    );
                }
            }
            map.insert(key.to_string(), node_to_json(node)?);
        }
        Ok(map.into())
    } else if dashes == nodes.len() {
        nodes
            .iter()
            .map(node_to_json)
            .collect::<miette::Result<Vec<_>>>()
            .map(Value::from)
    } else {
        let (Some(dash), Some(named)) = (
            nodes.iter().find(|n| is_array_element(n)),
            nodes.iter().find(|n| !is_array_element(n)),
        ) else {
            unreachable!("0 < dashes < nodes.len() means both kinds are present");
        };
        bail!(
            labels = [
                LabeledSpan::at(*dash.span(), "array element"),
                LabeledSpan::at(*named.span(), "object property"),
            ],
            help = "to use a literal - as a key, quote it: \"-\"",
            "can't tell whether this is an object or an array"
        )
    }
}

/// Interprets the arguments, properties or body of `node` as a JSON value.
/// The node's own name is not part of the value.
pub fn node_to_json(node: &KdlNode) -> miette::Result<Value> {
    if let Some(ty) = node.ty() {
        bail!(
            labels = [LabeledSpan::at(*ty.span(), "here")],
            "type annotations aren't used in board config"
        );
    }

    let entries = node.entries();
    if let Some(children) = node.children() {
        if let Some(first) = entries.first() {
            bail!(
                labels = [
                    LabeledSpan::at(*first.span(), "argument"),
                    LabeledSpan::at(*children.span(), "children"),
                ],
                "node may have children ({{...}}) or arguments but not both"
            );
        }
        return doc_to_json(children);
    }

    let named = entries.iter().filter(|e| e.name().is_some()).count();
    match (named, entries.len()) {
        (_, 0) => bail!(
            labels = [LabeledSpan::at(*node.span(), "no value")],
            "`{}` needs a value", node.name().value()
        ),
        (n, total) if n == total => {
            let mut map = Map::new();
            for e in entries {
                if let Some(name) = e.name() {
                    map.insert(name.value().to_string(), scalar(e.value()));
                }
            }
            Ok(map.into())
        }
        (0, 1) => Ok(scalar(entries[0].value())),
        (0, _) => Ok(entries.iter().map(|e| scalar(e.value())).collect::<Vec<_>>().into()),
        _ => {
            let (Some(prop), Some(arg)) = (
                entries.iter().find(|e| e.name().is_some()),
                entries.iter().find(|e| e.name().is_none()),
            ) else {
                unreachable!("0 < named < entries.len() means both kinds are present");
            };
            bail!(
                labels = [
                    LabeledSpan::at(*prop.span(), "has a name"),
                    LabeledSpan::at(*arg.span(), "doesn't"),
                ],
                help = "name every argument (object) or none of them (array)",
                "can't tell whether this is an object or an array"
            )
        }
    }
}

fn is_array_element(node: &KdlNode) -> bool {
    let name = node.name();
    // A quoted "-" has a repr with the quotes in it; only a bare dash counts.
    name.value() == "-" && name.repr().map_or(true, |r| r == "-")
}

fn scalar(value: &KdlValue) -> Value {
    match value.clone() {
        KdlValue::RawString(s) | KdlValue::String(s) => s.into(),
        KdlValue::Base2(i) | KdlValue::Base8(i) | KdlValue::Base10(i)
            | KdlValue::Base16(i) => i.into(),
        KdlValue::Base10Float(f) => f.into(),
        KdlValue::Bool(b) => b.into(),
        KdlValue::Null => Value::Null,
    }
}
