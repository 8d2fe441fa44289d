use std::io::Cursor;

use xmltree::{Element, EmitterConfig, XMLNode};

/// Describe la información necesaria para localizar un nodo en el XML de propiedades.
#[derive(Clone, Copy, Debug)]
pub(crate) struct FieldSpec {
    pub(crate) prefix: Option<&'static str>,
    pub(crate) local_name: &'static str,
    pub(crate) namespace: &'static str,
}

impl FieldSpec {
    pub(crate) const fn prefixed(prefix: &'static str, local_name: &'static str, namespace: &'static str) -> Self {
        Self {
            prefix: Some(prefix),
            local_name,
            namespace,
        }
    }

    pub(crate) const fn unprefixed(local_name: &'static str, namespace: &'static str) -> Self {
        Self {
            prefix: None,
            local_name,
            namespace,
        }
    }

    pub(crate) fn same_node(&self, other: &FieldSpec) -> bool {
        self.local_name == other.local_name && self.namespace == other.namespace
    }
}

pub(crate) fn parse_part(contents: &[u8]) -> Result<Element, String> {
    Element::parse(Cursor::new(contents)).map_err(|e| format!("Error leyendo XML de metadata: {}", e))
}

pub(crate) fn write_part(root: &Element) -> Result<Vec<u8>, String> {
    let mut output = Vec::new();
    let mut config = EmitterConfig::new();
    config.perform_indent = false;
    config.write_document_declaration = true;
    root.write_with_config(&mut output, config)
        .map_err(|e| format!("Error escribiendo XML limpio: {}", e))?;
    Ok(output)
}

/// Busca el hijo directo de `root` que corresponde a `spec`.
pub(crate) fn find_field<'a>(root: &'a Element, spec: &FieldSpec) -> Option<&'a Element> {
    root.children.iter().find_map(|node| match node {
        XMLNode::Element(child) if element_matches(child, spec) => Some(child),
        _ => None,
    })
}

/// Inserta o sustituye el contenido de un elemento de metadata y lo devuelve.
pub(crate) fn set_field<'a>(
    root: &'a mut Element,
    spec: &FieldSpec,
    value: &str,
) -> Option<&'a mut Element> {
    if find_field(root, spec).is_none() {
        let mut child = Element::new(spec.local_name);
        child.prefix = spec.prefix.map(str::to_string);
        child.namespace = Some(spec.namespace.to_string());
        root.children.push(XMLNode::Element(child));
    }

    let child = root.children.iter_mut().find_map(|node| match node {
        XMLNode::Element(child) if element_matches(child, spec) => Some(child),
        _ => None,
    })?;
    set_element_text(child, value);
    Some(child)
}

/// Hijos directos de `root` con nombre local `name`.
pub(crate) fn child_elements<'a>(root: &'a Element, name: &'a str) -> impl Iterator<Item = &'a Element> + 'a {
    root.children.iter().filter_map(move |node| match node {
        XMLNode::Element(child) if child.name == name => Some(child),
        _ => None,
    })
}

/// Añade al final de `root` un elemento vacío en el espacio de nombres de la raíz.
pub(crate) fn append_entry(root: &mut Element, name: &str, attributes: &[(&str, &str)]) {
    let mut entry = Element::new(name);
    entry.namespace = root.namespace.clone();
    for (key, value) in attributes {
        entry.attributes.insert(key.to_string(), value.to_string());
    }
    root.children.push(XMLNode::Element(entry));
}

fn element_matches(element: &Element, spec: &FieldSpec) -> bool {
    element.name == spec.local_name && element.namespace.as_deref() == Some(spec.namespace)
}

/// Sustituye el texto de un elemento; devuelve `false` si ya tenía ese valor.
pub(crate) fn set_element_text(element: &mut Element, new_value: &str) -> bool {
    if element_text_content(element) == new_value {
        return false;
    }

    element
        .children
        .retain(|node| !matches!(node, XMLNode::Text(_) | XMLNode::CData(_)));
    if !new_value.is_empty() {
        element.children.push(XMLNode::Text(new_value.to_string()));
    }
    true
}

/// Devuelve el texto plano contenido dentro de un elemento.
pub(crate) fn element_text_content(element: &Element) -> String {
    let mut content = String::new();
    for node in &element.children {
        match node {
            XMLNode::Text(text) | XMLNode::CData(text) => content.push_str(text),
            _ => {}
        }
    }
    content.trim().to_string()
}
