//! Runtime environment detection.

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotebookKind {
    Jupyter,
}

impl fmt::Display for NotebookKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Jupyter => f.write_str("jupyter"),
        }
    }
}

/// The notebook this process runs under, if any.
pub fn notebook_kind() -> Option<NotebookKind> {
    notebook_kind_from(std::env::vars_os().map(|(k, _)| k.to_string_lossy().into_owned()))
}

/// Same as [`notebook_kind`] over an explicit set of variable names.
pub fn notebook_kind_from<I, S>(var_names: I) -> Option<NotebookKind>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    var_names
        .into_iter()
        .any(|name| {
            let name = name.as_ref();
            name.starts_with("JUPYTER_") || name.starts_with("JPY_")
        })
        .then_some(NotebookKind::Jupyter)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_jupyter_variables() {
        assert_eq!(notebook_kind_from(["PATH", "JPY_PARENT_PID"]), Some(NotebookKind::Jupyter));
        assert_eq!(notebook_kind_from(["JUPYTER_SERVER_ROOT"]), Some(NotebookKind::Jupyter));
        assert_eq!(NotebookKind::Jupyter.to_string(), "jupyter");
    }

    #[test]
    fn plain_shell_is_not_a_notebook() {
        assert_eq!(notebook_kind_from(["PATH", "HOME", "JUPYTERX", "MY_JPY_THING"]), None);
        assert_eq!(notebook_kind_from(Vec::<String>::new()), None);
    }
}
