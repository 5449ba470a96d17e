use std::fmt;

/// A slash-delimited path into the node tree, e.g. "/Target/ToDo/1".
///
/// Paths are always resolved relative to the tree root; a leading slash is
/// optional and stripped on construction.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Path {
    components: Vec<String>,
}

impl Path {
    pub fn root() -> Self {
        Self { components: vec![] }
    }

    pub fn parse(s: &str) -> Self {
        let components = s
            .split('/')
            .filter(|part| !part.is_empty())
            .map(|part| part.to_string())
            .collect();
        Self { components }
    }

    pub fn components(&self) -> &[String] {
        &self.components
    }

    pub fn join(&self, name: &str) -> Self {
        let mut components = self.components.clone();
        components.push(name.to_string());
        Self { components }
    }

    pub fn parent(&self) -> Option<Path> {
        if self.components.is_empty() {
            return None;
        }

        let mut components = self.components.clone();
        components.pop();
        Some(Self { components })
    }

    pub fn last(&self) -> Option<&str> {
        self.components.last().map(|s| s.as_str())
    }

    pub fn is_root(&self) -> bool {
        self.components.is_empty()
    }
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "/")?;
        write!(f, "{}", self.components.join("/"))
    }
}

impl From<&str> for Path {
    fn from(s: &str) -> Self {
        Path::parse(s)
    }
}

impl From<String> for Path {
    fn from(s: String) -> Self {
        Path::parse(&s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_leading_and_trailing_slashes() {
        assert_eq!(
            Path::parse("/Target/ToDo/1").components(),
            &["Target".to_string(), "ToDo".to_string(), "1".to_string()]
        );
        assert_eq!(Path::parse("Target/ToDo/1/"), Path::parse("/Target/ToDo/1"));
        assert_eq!(Path::parse("/"), Path::root());
    }

    #[test]
    fn join_and_parent_are_inverses() {
        let p = Path::root().join("Target").join("ToDo").join("1");
        assert_eq!(p, Path::parse("/Target/ToDo/1"));
        assert_eq!(p.parent(), Some(Path::parse("/Target/ToDo")));
        assert_eq!(p.last(), Some("1"));
    }
}
