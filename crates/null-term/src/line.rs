//! Line-mode panel input: `::` directives control the panel, anything else
//! is typed into the active terminal.

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PanelLine {
    New,
    Close,
    Next,
    Prev,
    Tab(usize),
    Tabs,
    Hide,
    Show,
    Toggle,
    Height(u32),
    Quit,
    Input(String),
}

const PREFIX: &str = "::";

impl PanelLine {
    pub fn parse(line: &str) -> Result<Self, String> {
        let Some(directive) = line.trim_end().strip_prefix(PREFIX) else {
            return Ok(PanelLine::Input(format!("{}\n", line)));
        };

        let mut parts = directive.split_whitespace();
        let name = parts.next().unwrap_or_default();
        let arg = parts.next();
        if parts.next().is_some() {
            return Err(format!("too many arguments for '::{}'", name));
        }

        match (name, arg) {
            ("new", None) => Ok(PanelLine::New),
            ("close", None) => Ok(PanelLine::Close),
            ("next", None) => Ok(PanelLine::Next),
            ("prev", None) => Ok(PanelLine::Prev),
            ("tabs", None) => Ok(PanelLine::Tabs),
            ("hide", None) => Ok(PanelLine::Hide),
            ("show", None) => Ok(PanelLine::Show),
            ("toggle", None) => Ok(PanelLine::Toggle),
            ("quit", None) => Ok(PanelLine::Quit),
            ("tab", Some(n)) => n
                .parse()
                .map(PanelLine::Tab)
                .map_err(|_| format!("'::tab' expects a tab number, got '{}'", n)),
            ("height", Some(px)) => px
                .parse()
                .map(PanelLine::Height)
                .map_err(|_| format!("'::height' expects pixels, got '{}'", px)),
            (
                "new" | "close" | "next" | "prev" | "tabs" | "hide" | "show" | "toggle" | "quit",
                Some(_),
            ) => Err(format!("'::{}' takes no arguments", name)),
            ("tab", None) | ("height", None) => Err(format!("'::{}' needs an argument", name)),
            ("", _) => Err("empty directive".to_string()),
            (other, _) => Err(format!("unknown directive '::{}'", other)),
        }
    }
}
