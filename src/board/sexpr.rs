//! Minimal S-expression reader for `.kicad_pcb` files

use crate::error::{PreviewError, Result};

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Sexpr {
    Atom(String),
    List(Vec<Sexpr>),
}

impl Sexpr {
    pub(crate) fn as_atom(&self) -> Option<&str> {
        match self {
            Sexpr::Atom(s) => Some(s),
            Sexpr::List(_) => None,
        }
    }

    pub(crate) fn items(&self) -> &[Sexpr] {
        match self {
            Sexpr::List(items) => items,
            Sexpr::Atom(_) => &[],
        }
    }

    /// Name of a list, i.e. its leading atom
    pub(crate) fn head(&self) -> Option<&str> {
        self.items().first().and_then(Sexpr::as_atom)
    }

    /// Direct child lists named `name`
    pub(crate) fn children<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a Sexpr> + 'a {
        self.items()
            .iter()
            .filter(move |item| item.head() == Some(name))
    }

    pub(crate) fn child(&self, name: &str) -> Option<&Sexpr> {
        self.items().iter().find(|item| item.head() == Some(name))
    }

    /// Atom at position `index` after the head
    pub(crate) fn arg(&self, index: usize) -> Option<&str> {
        self.items().get(index + 1).and_then(Sexpr::as_atom)
    }

    pub(crate) fn arg_f64(&self, index: usize) -> Option<f64> {
        self.arg(index).and_then(|s| s.parse().ok())
    }

    /// Plain atom arguments, skipping nested lists
    pub(crate) fn atom_args(&self) -> impl Iterator<Item = &str> {
        self.items().iter().skip(1).filter_map(Sexpr::as_atom)
    }
}

pub(crate) fn parse(content: &str) -> Result<Sexpr> {
    let mut stack: Vec<Vec<Sexpr>> = Vec::new();
    let mut root: Option<Sexpr> = None;
    let mut chars = content.char_indices().peekable();

    while let Some((pos, c)) = chars.next() {
        match c {
            '(' => stack.push(Vec::new()),
            ')' => {
                let list = stack.pop().ok_or_else(|| parse_error(pos, "unbalanced ')'"))?;
                let node = Sexpr::List(list);
                match stack.last_mut() {
                    Some(parent) => parent.push(node),
                    None if root.is_none() => root = Some(node),
                    None => return Err(parse_error(pos, "more than one top-level list").into()),
                }
            }
            '"' => {
                let mut atom = String::new();
                let mut closed = false;
                while let Some((_, c)) = chars.next() {
                    match c {
                        '\\' => {
                            if let Some((_, escaped)) = chars.next() {
                                atom.push(match escaped {
                                    'n' => '\n',
                                    't' => '\t',
                                    other => other,
                                });
                            }
                        }
                        '"' => {
                            closed = true;
                            break;
                        }
                        other => atom.push(other),
                    }
                }
                if !closed {
                    return Err(parse_error(pos, "unterminated string").into());
                }
                push_atom(&mut stack, atom, pos)?;
            }
            c if c.is_whitespace() => {}
            _ => {
                let mut atom = String::from(c);
                while let Some(&(_, next)) = chars.peek() {
                    if next.is_whitespace() || next == '(' || next == ')' || next == '"' {
                        break;
                    }
                    atom.push(next);
                    chars.next();
                }
                push_atom(&mut stack, atom, pos)?;
            }
        }
    }

    if !stack.is_empty() {
        return Err(parse_error(content.len(), "unbalanced '('").into());
    }
    root.ok_or_else(|| parse_error(0, "empty document").into())
}

fn push_atom(stack: &mut [Vec<Sexpr>], atom: String, pos: usize) -> Result<()> {
    match stack.last_mut() {
        Some(list) => {
            list.push(Sexpr::Atom(atom));
            Ok(())
        }
        None => Err(parse_error(pos, "atom outside of a list").into()),
    }
}

fn parse_error(pos: usize, what: &str) -> PreviewError {
    PreviewError::BoardParse {
        reason: format!("{} at byte {}", what, pos),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nested_lists_and_atoms() {
        let tree = parse(r#"(kicad_pcb (version 20221018) (layers (0 "F.Cu" signal)))"#)
            .expect("parse");

        assert_eq!(tree.head(), Some("kicad_pcb"));
        assert_eq!(tree.child("version").and_then(|v| v.arg(0)), Some("20221018"));

        let layer = tree.child("layers").expect("layers").items()[1].clone();
        assert_eq!(layer.items()[1], Sexpr::Atom("F.Cu".to_string()));
    }

    #[test]
    fn test_quoted_strings_keep_spaces_and_escapes() {
        let tree = parse(r#"(gr_text "Rev \"A\" (draft)" (at 1 2))"#).expect("parse");

        assert_eq!(tree.arg(0), Some(r#"Rev "A" (draft)"#));
        assert_eq!(tree.child("at").and_then(|at| at.arg_f64(1)), Some(2.0));
    }

    fn lookup<'t>(tree: &'t Sexpr, name: &str) -> Option<&'t Sexpr> {
        tree.child(name)
    }

    #[test]
    fn test_child_outlives_the_looked_up_name() {
        let tree = parse("(pad (at 1 2) (drill 0.8) (at 3 4))").expect("parse");

        let found = {
            let name = String::from("at");
            lookup(&tree, &name)
        };
        assert_eq!(found.and_then(|at| at.arg_f64(0)), Some(1.0));
        assert!(lookup(&tree, "size").is_none());
        assert_eq!(tree.children("at").count(), 2);
    }

    #[test]
    fn test_unbalanced_input_is_rejected() {
        assert!(parse("(kicad_pcb (version 1)").is_err());
        assert!(parse("(a))").is_err());
        assert!(parse("").is_err());
        assert!(parse(r#"(a "open)"#).is_err());
    }
}
