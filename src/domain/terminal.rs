use super::remote::PosTerminal;

/// The mode and terminal a payment screen should open with.
#[derive(Debug, PartialEq, Eq, Clone)]
pub enum TerminalChoice {
    /// No active terminal; fall back to a payment link.
    LinkOnly,
    Terminal(String),
    /// Several active terminals and no usable preference; the operator must pick.
    Unselected,
}

/// Picks the default terminal from the active ones, honouring the last terminal
/// used when it is still active.
pub fn select_default_terminal(
    terminals: &[PosTerminal],
    last_used: Option<&str>,
) -> TerminalChoice {
    let active: Vec<&PosTerminal> = terminals.iter().filter(|t| t.is_active()).collect();

    match active.as_slice() {
        [] => TerminalChoice::LinkOnly,
        [only] => TerminalChoice::Terminal(only.id.clone()),
        _ => match last_used {
            Some(last) if active.iter().any(|t| t.id == last) => {
                TerminalChoice::Terminal(last.to_string())
            }
            _ => TerminalChoice::Unselected,
        },
    }
}
