use super::node::Element;
use crate::palette::Color;
use lazy_static::lazy_static;
use regex::Regex;
use std::fmt;

lazy_static! {
    static ref DECLARATION: Regex =
        Regex::new(r"^\s*([A-Za-z][A-Za-z0-9-]*)\s*:\s*(.*?)\s*$").unwrap();
}

/// Colors written over the `fill` and `stroke` declarations of a subtree
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColorTransform {
    pub fill: Color,
    pub stroke: Color,
}

impl ColorTransform {
    pub fn new(fill: Color, stroke: Color) -> Self {
        Self { fill, stroke }
    }

    /// Same color for fill and stroke
    pub fn flat(color: Color) -> Self {
        Self::new(color, color)
    }
}

/// The declarations of an inline `style` attribute, in source order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StyleDecls(Vec<(String, String)>);

impl StyleDecls {
    /// Parse `key:value;` declarations. Returns `None` when any non-empty
    /// declaration is not of that form.
    pub fn parse(style: &str) -> Option<Self> {
        style
            .split(';')
            .filter(|decl| !decl.trim().is_empty())
            .map(|decl| {
                DECLARATION
                    .captures(decl)
                    .map(|caps| (caps[1].to_string(), caps[2].to_string()))
            })
            .collect::<Option<Vec<_>>>()
            .map(StyleDecls)
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Replace the value of an existing declaration. Absent keys are not added.
    pub fn replace(&mut self, key: &str, value: &str) -> bool {
        match self.0.iter_mut().find(|(k, _)| k == key) {
            Some((_, existing)) => {
                *existing = value.to_string();
                true
            }
            None => false,
        }
    }
}

impl fmt::Display for StyleDecls {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rendered: Vec<String> = self
            .0
            .iter()
            .map(|(key, value)| format!("{}:{};", key, value))
            .collect();
        write!(f, "{}", rendered.join(" "))
    }
}

/// Rewrite fill and stroke on `element` and every descendant.
///
/// Elements without a parsable style get a bare `stroke:<fill>;` so
/// stroke-only content stays visible.
pub fn recolor(element: &mut Element, transform: &ColorTransform) {
    let fill = transform.fill.to_string();
    let stroke = transform.stroke.to_string();

    element.visit_mut(&mut |node: &mut Element| {
        let style = match node.attr("style").and_then(StyleDecls::parse) {
            Some(mut decls) => {
                decls.replace("fill", &fill);
                decls.replace("stroke", &stroke);
                decls.to_string()
            }
            None => format!("stroke:{};", fill),
        };
        node.set_attr("style", style);
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    fn copper() -> Color {
        Color::rgb(0xE8, 0xD9, 0x59)
    }

    #[test]
    fn test_parse_and_render_declarations() {
        let decls = StyleDecls::parse("fill:#000000; fill-opacity:1.0;stroke:#000000 ;").unwrap();

        assert_eq!(decls.get("fill"), Some("#000000"));
        assert_eq!(decls.get("stroke"), Some("#000000"));
        assert_eq!(
            decls.to_string(),
            "fill:#000000; fill-opacity:1.0; stroke:#000000;"
        );
    }

    #[test]
    fn test_malformed_style_does_not_parse() {
        assert!(StyleDecls::parse("fill #000000").is_none());
        assert!(StyleDecls::parse("fill:#000; ;;").is_some());
    }

    #[test]
    fn test_recolor_rewrites_existing_keys_only() {
        let mut group = Element::new("g").with_attr("style", "fill:#000000; fill-opacity:1.0;");
        recolor(&mut group, &ColorTransform::flat(copper()));

        assert_eq!(group.attr("style"), Some("fill:#E8D959; fill-opacity:1.0;"));
    }

    #[test]
    fn test_recolor_falls_back_to_stroke_only() {
        let mut group = Element::new("g").with_attr("style", "fill:#000000;");
        group.push(Element::new("polyline").with_attr("stroke-width", "3"));
        group.push(Element::new("path").with_attr("style", "not a style"));
        recolor(&mut group, &ColorTransform::flat(copper()));

        let styles: Vec<_> = group
            .descendants()
            .iter()
            .filter_map(|e| e.attr("style"))
            .map(str::to_string)
            .collect();
        assert_eq!(styles, ["fill:#E8D959;", "stroke:#E8D959;", "stroke:#E8D959;"]);
    }

    #[test]
    fn test_recolor_is_idempotent() {
        let mut group = Element::new("g")
            .with_attr("style", "fill:#000000; fill-opacity:1.0; stroke:#123456; stroke-width:2;");
        group.push(Element::new("path"));
        let transform = ColorTransform::flat(copper());

        recolor(&mut group, &transform);
        let once = group.clone();
        recolor(&mut group, &transform);

        assert_eq!(group, once);
    }

    #[test]
    fn test_distinct_fill_and_stroke() {
        let mut group = Element::new("g").with_attr("style", "fill:#000000; stroke:#000000;");
        recolor(&mut group, &ColorTransform::new(Color::WHITE, Color::BLACK));

        assert_eq!(group.attr("style"), Some("fill:#FFFFFF; stroke:#000000;"));
    }
}
