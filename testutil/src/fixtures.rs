/// ASCII DAG schemes
///
/// Test DAGs are drawn as text, one column per validator:
///
/// ```text
/// a01   b01   c01
/// ║     ║     ║
/// a12 ─ ╬ ─ ─ ╣
/// ```
///
/// Event names are `<letter><index><frame>`. A link group starts with `╠`
/// (the column's last event) or `╚` (its second-to-last event), is extended
/// with `╣`/`╬` (last) or `╝`/`╩` (second-to-last), and is owned by the
/// event name on the same line. The self-parent is always the previous event
/// of the event's own column.

use thiserror::Error;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum SchemeError {
    #[error("Line {line}: event {name} defined twice")]
    DuplicateName { line: usize, name: String },

    #[error("Line {line}: column {column} has no event to link to")]
    EmptyColumn { line: usize, column: usize },

    #[error("Line {line}: link group has no event")]
    DanglingLink { line: usize },

    #[error("Line {line}: link symbol {symbol} outside of a group")]
    NoGroup { line: usize, symbol: String },
}

/// One event of a parsed scheme
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ScriptedEvent {
    pub name: String,
    /// Column of the event
    pub creator: usize,
    /// Index into `Scheme::events`
    pub self_parent: Option<usize>,
    /// Indices into `Scheme::events`, self-parent excluded
    pub other_parents: Vec<usize>,
}

impl ScriptedEvent {
    /// Uppercase first letter marks an expected root
    pub fn expected_root(&self) -> bool {
        self.name
            .chars()
            .next()
            .map_or(false, |c| c.is_uppercase())
    }

    /// Third character of the name is the expected frame
    pub fn expected_frame(&self) -> Option<u32> {
        self.name.chars().nth(2).and_then(|c| c.to_digit(10))
    }
}

/// Parsed scheme, events in creation order
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Scheme {
    pub validators: usize,
    pub events: Vec<ScriptedEvent>,
}

impl Scheme {
    pub fn get(&self, name: &str) -> Option<&ScriptedEvent> {
        self.events.iter().find(|e| e.name == name)
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.events.iter().position(|e| e.name == name)
    }

    /// Build concrete events in scheme order
    ///
    /// `build` receives the scripted event, its already built self-parent
    /// and other parents.
    pub fn materialize<E, F>(&self, mut build: F) -> Vec<E>
    where
        F: FnMut(&ScriptedEvent, Option<&E>, &[&E]) -> E,
    {
        let mut built: Vec<E> = Vec::with_capacity(self.events.len());
        for scripted in &self.events {
            let others: Vec<&E> = scripted.other_parents.iter().map(|i| &built[*i]).collect();
            let self_parent = scripted.self_parent.map(|i| &built[i]);
            let event = build(scripted, self_parent, &others);
            built.push(event);
        }
        built
    }
}

#[derive(Clone, Copy, Debug)]
enum Link {
    Last(usize),
    PreLast(usize),
    Own,
}

/// Parse an ASCII scheme
pub fn parse_scheme(scheme: &str) -> Result<Scheme, SchemeError> {
    let mut columns: Vec<Vec<usize>> = Vec::new();
    let mut result = Scheme::default();

    for (line_no, line) in scheme.lines().enumerate() {
        let line_no = line_no + 1;
        let mut names: Vec<(String, usize)> = Vec::new();
        let mut groups: Vec<Vec<Link>> = Vec::new();

        let symbols = line
            .split_whitespace()
            .filter(|s| *s != "─" && *s != "═");
        for (column, symbol) in symbols.enumerate() {
            match symbol {
                "╠" | "║╠" | "╠╫" => groups.push(vec![Link::Last(column)]),
                "╚" | "║╚" => groups.push(vec![Link::PreLast(column)]),
                "╣" | "╣║" | "╫╣" | "╬" => last_group(&mut groups, line_no, symbol)?
                    .push(Link::Last(column)),
                "╝" | "╝║" | "╩╫" | "╫╩" => last_group(&mut groups, line_no, symbol)?
                    .push(Link::PreLast(column)),
                "║" | "║║" | "╫" => {}
                name => {
                    names.push((name.trim_matches('║').to_string(), column));
                    if groups.len() < names.len() {
                        groups.push(vec![Link::Own]);
                    } else {
                        last_group(&mut groups, line_no, name)?.push(Link::Own);
                    }
                }
            }
        }

        if groups.len() > names.len() {
            return Err(SchemeError::DanglingLink { line: line_no });
        }

        for ((name, creator), links) in names.into_iter().zip(groups) {
            if result.get(&name).is_some() {
                return Err(SchemeError::DuplicateName {
                    line: line_no,
                    name,
                });
            }
            if columns.len() <= creator {
                columns.resize(creator + 1, Vec::new());
            }

            let mut other_parents = Vec::new();
            for link in links {
                let (column, back) = match link {
                    Link::Own => continue,
                    Link::Last(c) => (c, 1),
                    Link::PreLast(c) => (c, 2),
                };
                let parent = columns
                    .get(column)
                    .and_then(|events| events.len().checked_sub(back).map(|i| events[i]))
                    .ok_or(SchemeError::EmptyColumn {
                        line: line_no,
                        column,
                    })?;
                other_parents.push(parent);
            }

            let idx = result.events.len();
            result.events.push(ScriptedEvent {
                name,
                creator,
                self_parent: columns[creator].last().copied(),
                other_parents,
            });
            columns[creator].push(idx);
        }
    }

    result.validators = columns.len();
    Ok(result)
}

fn last_group<'a>(
    groups: &'a mut [Vec<Link>],
    line: usize,
    symbol: &str,
) -> Result<&'a mut Vec<Link>, SchemeError> {
    groups.last_mut().ok_or_else(|| SchemeError::NoGroup {
        line,
        symbol: symbol.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_links() {
        let scheme = parse_scheme(
            "
A01     B01     C01
║       ║       ║
a11 ─ ─ ╬ ─ ─ ─ ╣
║       ║       ║
╠ ─ ─ ─ B12     ║
║       ║       ║
║╚  ─ ─ ╫ ─ ─ ─ c11
",
        )
        .unwrap();

        assert_eq!(scheme.validators, 3);
        let names: Vec<&str> = scheme.events.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["A01", "B01", "C01", "a11", "B12", "c11"]);

        let a11 = scheme.get("a11").unwrap();
        assert_eq!(a11.self_parent, scheme.index_of("A01"));
        assert_eq!(a11.other_parents, vec![1, 2]);

        let b12 = scheme.get("B12").unwrap();
        assert_eq!(b12.creator, 1);
        assert_eq!(b12.other_parents, vec![scheme.index_of("a11").unwrap()]);

        // Second-to-last event of column 0
        let c11 = scheme.get("c11").unwrap();
        assert_eq!(c11.other_parents, vec![0]);
        assert_eq!(c11.self_parent, Some(2));

        assert!(scheme.get("B12").unwrap().expected_root());
        assert!(!a11.expected_root());
        assert_eq!(b12.expected_frame(), Some(2));
    }

    #[test]
    fn test_two_events_on_one_line() {
        let scheme = parse_scheme(
            "
a01     b01
║       ║
a12 ─ ─ ╣       c01
",
        )
        .unwrap();
        let c01 = scheme.get("c01").unwrap();
        assert_eq!(c01.creator, 2);
        assert!(c01.self_parent.is_none());
        assert!(c01.other_parents.is_empty());
        assert_eq!(scheme.get("a12").unwrap().other_parents, vec![1]);
    }

    #[test]
    fn test_materialize_passes_built_parents() {
        let scheme = parse_scheme(
            "
A01     B01
║       ║
a11 ─ ─ ╣
║       ║
╠ ─ ─ ─ B12
",
        )
        .unwrap();

        // Each built value records its name and the names it was built from
        let built = scheme.materialize(|scripted, self_parent: Option<&String>, others| {
            let mut label = scripted.name.clone();
            if let Some(sp) = self_parent {
                label = format!("{label}<{sp}");
            }
            for other in others {
                label = format!("{label}+{other}");
            }
            label
        });
        assert_eq!(built[0], "A01");
        assert_eq!(built[2], "a11<A01+B01");
        assert_eq!(built[3], "B12<B01+a11<A01+B01");
    }

    #[test]
    fn test_parse_errors() {
        assert_eq!(
            parse_scheme("a01\na01"),
            Err(SchemeError::DuplicateName {
                line: 2,
                name: "a01".to_string()
            })
        );
        assert_eq!(
            parse_scheme("a01 ─ ╣"),
            Err(SchemeError::EmptyColumn { line: 1, column: 1 })
        );
        assert_eq!(
            parse_scheme("╣ a01"),
            Err(SchemeError::NoGroup {
                line: 1,
                symbol: "╣".to_string()
            })
        );
        assert_eq!(
            parse_scheme("a01 b01\n╠ ─ ╣"),
            Err(SchemeError::DanglingLink { line: 2 })
        );
    }
}
