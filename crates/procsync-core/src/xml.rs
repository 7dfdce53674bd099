//! XML persistence: procedure mutations and whole workspaces.
//!
//! Declaration mutation:
//!
//! ```xml
//! <mutation name="foo" statements="false">
//!   <arg name="a" paramId="p3"/>
//! </mutation>
//! ```
//!
//! `name` and `paramId` are only written when serializing for caller
//! reconnection; `statements` is only written when the body is hidden.
//! Call mutation: `<mutation name="foo"><arg name="a"/></mutation>`, never
//! with identities.
//!
//! Workspaces use the usual block document layout (`<xml>` root, `block`,
//! `mutation`, `field`, `value`, `statement`, `next`). Parameter identities
//! are not persisted: loading issues fresh ones and binds every call to its
//! declaration.

use std::fmt::Display;

use xmltree::{Element, EmitterConfig, XMLNode};

use crate::block::{
    Block, BlockKind, GenericBlock, Link, CALL_NO_RETURN, CALL_RETURN, DEF_NO_RETURN, DEF_RETURN, NAME_FIELD,
};
use crate::call::CallSite;
use crate::error::CoreError;
use crate::id::{BlockId, ParamId};
use crate::param::ParamDescriptor;
use crate::procedure::ProcedureDecl;
use crate::workspace::Workspace;

fn xml_error(reason: impl Display) -> CoreError {
    CoreError::Xml {
        reason: reason.to_string(),
    }
}

fn child_elements(el: &Element) -> impl Iterator<Item = &Element> {
    el.children.iter().filter_map(XMLNode::as_element)
}

/// One `<arg>` of a mutation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MutationArg {
    pub name: String,
    pub param_id: Option<ParamId>,
}

/// The `<mutation>` of a declaration block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeclarationMutation {
    pub name: Option<String>,
    pub statements: bool,
    pub args: Vec<MutationArg>,
}

impl DeclarationMutation {
    /// Captures a declaration. With `with_param_ids` the procedure name and
    /// each parameter's identity are included.
    pub fn from_declaration(decl: &ProcedureDecl, with_param_ids: bool) -> Self {
        DeclarationMutation {
            name: with_param_ids.then(|| decl.name().to_string()),
            statements: decl.has_body(),
            args: decl
                .params()
                .iter()
                .map(|p| MutationArg {
                    name: p.name.clone(),
                    param_id: with_param_ids.then_some(p.id),
                })
                .collect(),
        }
    }

    pub fn to_element(&self) -> Element {
        let mut el = Element::new("mutation");
        if let Some(name) = &self.name {
            el.attributes.insert("name".into(), name.clone());
        }
        for arg in &self.args {
            let mut child = Element::new("arg");
            child.attributes.insert("name".into(), arg.name.clone());
            if let Some(id) = arg.param_id {
                child.attributes.insert("paramId".into(), id.to_string());
            }
            el.children.push(XMLNode::Element(child));
        }
        if !self.statements {
            el.attributes.insert("statements".into(), "false".into());
        }
        el
    }

    pub fn from_element(el: &Element) -> Result<Self, CoreError> {
        let mut args = Vec::new();
        for child in child_elements(el).filter(|c| c.name.eq_ignore_ascii_case("arg")) {
            let name = child.attributes.get("name").cloned().unwrap_or_default();
            let param_id = child
                .attributes
                .get("paramId")
                .map(|raw| raw.parse::<ParamId>().map_err(|e| xml_error(format!("bad paramId '{raw}': {e}"))))
                .transpose()?;
            args.push(MutationArg { name, param_id });
        }
        Ok(DeclarationMutation {
            name: el.attributes.get("name").cloned(),
            statements: el.attributes.get("statements").map(String::as_str) != Some("false"),
            args,
        })
    }
}

/// The `<mutation>` of a call block.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CallMutation {
    pub name: String,
    pub args: Vec<String>,
}

impl CallMutation {
    pub fn from_call(call: &CallSite) -> Self {
        CallMutation {
            name: call.target().to_string(),
            args: call.arg_names(),
        }
    }

    pub fn to_element(&self) -> Element {
        let mut el = Element::new("mutation");
        el.attributes.insert("name".into(), self.name.clone());
        for arg in &self.args {
            let mut child = Element::new("arg");
            child.attributes.insert("name".into(), arg.clone());
            el.children.push(XMLNode::Element(child));
        }
        el
    }

    pub fn from_element(el: &Element) -> Result<Self, CoreError> {
        let name = el
            .attributes
            .get("name")
            .cloned()
            .ok_or_else(|| xml_error("call mutation without a name"))?;
        let args = child_elements(el)
            .filter(|c| c.name.eq_ignore_ascii_case("arg"))
            .map(|c| c.attributes.get("name").cloned().unwrap_or_default())
            .collect();
        Ok(CallMutation { name, args })
    }
}

// ---------------------------------------------------------------------------
// Workspace documents
// ---------------------------------------------------------------------------

/// Serializes every top-level block (and everything below it).
pub fn write_workspace(ws: &Workspace) -> Result<String, CoreError> {
    let mut root = Element::new("xml");
    for id in ws.top_blocks() {
        root.children.push(XMLNode::Element(block_element(ws, id)?));
    }
    let mut out = Vec::new();
    root.write_with_config(&mut out, EmitterConfig::new().perform_indent(true))
        .map_err(xml_error)?;
    String::from_utf8(out).map_err(xml_error)
}

fn field_element(name: &str, value: &str) -> Element {
    let mut field = Element::new("field");
    field.attributes.insert("name".into(), name.into());
    field.children.push(XMLNode::Text(value.into()));
    field
}

fn block_element(ws: &Workspace, id: BlockId) -> Result<Element, CoreError> {
    let block = ws.block(id).ok_or(CoreError::BlockNotFound { id })?;
    let mut el = Element::new("block");
    el.attributes.insert("type".into(), block.type_name().into());
    el.attributes.insert("id".into(), id.to_string());
    if ws.parent_of(id).is_none() {
        el.attributes.insert("x".into(), block.position.x.to_string());
        el.attributes.insert("y".into(), block.position.y.to_string());
    }
    if block.collapsed {
        el.attributes.insert("collapsed".into(), "true".into());
    }
    if block.disabled {
        el.attributes.insert("disabled".into(), "true".into());
    }

    match &block.kind {
        BlockKind::Declaration(decl) => {
            el.children.push(XMLNode::Element(DeclarationMutation::from_declaration(decl, false).to_element()));
            el.children.push(XMLNode::Element(field_element(NAME_FIELD, decl.name())));
        }
        BlockKind::Call(call) => {
            el.children.push(XMLNode::Element(CallMutation::from_call(call).to_element()));
        }
        BlockKind::Generic(generic) => {
            for (name, value) in &generic.fields {
                el.children.push(XMLNode::Element(field_element(name, value)));
            }
        }
    }

    let mut next = None;
    for (link, child) in ws.children(id) {
        match link {
            Link::Input { name } => {
                let is_value = ws.block(child).is_some_and(Block::has_output);
                let mut wrapper = Element::new(if is_value { "value" } else { "statement" });
                wrapper.attributes.insert("name".into(), name);
                wrapper.children.push(XMLNode::Element(block_element(ws, child)?));
                el.children.push(XMLNode::Element(wrapper));
            }
            Link::Next => next = Some(child),
        }
    }
    if let Some(child) = next {
        let mut wrapper = Element::new("next");
        wrapper.children.push(XMLNode::Element(block_element(ws, child)?));
        el.children.push(XMLNode::Element(wrapper));
    }
    Ok(el)
}

/// Blocks needing a second pass once the whole document is loaded.
#[derive(Default)]
struct Pending {
    declarations: Vec<BlockId>,
    calls: Vec<BlockId>,
}

/// Loads a workspace document.
///
/// Declarations get legal unique names and fresh parameter identities;
/// calls are then bound to their declarations (or left orphaned). Loading
/// records no change events.
pub fn read_workspace(text: &str) -> Result<Workspace, CoreError> {
    let root = Element::parse(text.as_bytes()).map_err(xml_error)?;
    if root.name != "xml" {
        return Err(xml_error(format!("expected <xml> root, found <{}>", root.name)));
    }

    let mut ws = Workspace::new();
    let mut pending = Pending::default();
    for el in child_elements(&root).filter(|c| c.name == "block") {
        let id = read_block(&mut ws, el, false, &mut pending)?;
        let x = el.attributes.get("x").and_then(|v| v.parse().ok()).unwrap_or(0);
        let y = el.attributes.get("y").and_then(|v| v.parse().ok()).unwrap_or(0);
        ws.set_position(id, crate::block::Position { x, y })?;
    }

    for decl in pending.declarations {
        let name = ws.declaration(decl)?.name().to_string();
        let legal = ws.legal_procedure_name(&name, None);
        if legal != name {
            tracing::warn!(name = %name, legal = %legal, "renamed colliding procedure on load");
        }
        ws.declaration_mut(decl)?.name = legal.clone();
        ws.register_procedure(&legal, decl);
    }
    for call in pending.calls {
        ws.bind_call(call)?;
    }
    ws.take_events();
    Ok(ws)
}

fn read_block(ws: &mut Workspace, el: &Element, output: bool, pending: &mut Pending) -> Result<BlockId, CoreError> {
    let type_name = el
        .attributes
        .get("type")
        .cloned()
        .ok_or_else(|| xml_error("block without a type"))?;
    let fields: Vec<(String, String)> = child_elements(el)
        .filter(|c| c.name == "field")
        .map(|c| {
            let name = c.attributes.get("name").cloned().unwrap_or_default();
            let value = c.get_text().map(|t| t.into_owned()).unwrap_or_default();
            (name, value)
        })
        .collect();
    let mutation = el.get_child("mutation");

    let id = match type_name.as_str() {
        DEF_NO_RETURN | DEF_RETURN => {
            let mutation = mutation
                .map(DeclarationMutation::from_element)
                .transpose()?
                .unwrap_or(DeclarationMutation {
                    name: None,
                    statements: true,
                    args: Vec::new(),
                });
            let name = fields
                .iter()
                .find(|(field, _)| field == NAME_FIELD)
                .map(|(_, value)| value.clone())
                .or(mutation.name.clone())
                .unwrap_or_default();
            let mut decl = ProcedureDecl::new(name, type_name == DEF_RETURN);
            decl.params = mutation
                .args
                .into_iter()
                .map(|arg| ParamDescriptor::new(ws.param_ids.issue(), arg.name))
                .collect();
            decl.has_body = mutation.statements;
            decl.refresh_params();
            let id = ws.add_block(BlockKind::Declaration(decl));
            pending.declarations.push(id);
            id
        }
        CALL_NO_RETURN | CALL_RETURN => {
            let mutation = mutation
                .map(CallMutation::from_element)
                .transpose()?
                .unwrap_or_default();
            let id = ws.add_unbound_call(mutation.name, type_name == CALL_RETURN, mutation.args);
            pending.calls.push(id);
            id
        }
        _ => {
            let mut generic = GenericBlock::new(type_name.clone(), output);
            generic.fields.extend(fields);
            ws.add_generic(generic)
        }
    };

    let flag = |name: &str| el.attributes.get(name).map(String::as_str) == Some("true");
    ws.set_collapsed(id, flag("collapsed"))?;
    ws.set_disabled(id, flag("disabled"))?;

    for child in child_elements(el) {
        let Some(inner) = child.get_child("block") else {
            continue;
        };
        match child.name.as_str() {
            "value" | "statement" => {
                let name = child
                    .attributes
                    .get("name")
                    .cloned()
                    .ok_or_else(|| xml_error(format!("<{}> without a name", child.name)))?;
                let sub = read_block(ws, inner, child.name == "value", pending)?;
                ws.connect_input(id, &name, sub)?;
            }
            "next" => {
                let sub = read_block(ws, inner, false, pending)?;
                ws.connect_next(id, sub)?;
            }
            _ => {}
        }
    }
    Ok(id)
}
