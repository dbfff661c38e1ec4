use std::io::{BufRead, IsTerminal, Write};

use crate::common::error::SimScaleError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkuDecision {
    Proceed,
    /// Use the given VM size instead of the selected one.
    Replace(String),
}

/// Asks whether a costly auto-selected VM size should be used.
pub trait SkuConfirmation {
    fn confirm(&mut self, vm_sku: &str, tasks_per_node: u32) -> crate::Result<SkuDecision>;
}

/// Accepts every selection without asking.
pub struct AutoApprove;

impl SkuConfirmation for AutoApprove {
    fn confirm(&mut self, vm_sku: &str, _tasks_per_node: u32) -> crate::Result<SkuDecision> {
        log::info!("Using {vm_sku} without confirmation");
        Ok(SkuDecision::Proceed)
    }
}

/// Prompts on `output` and reads the answer as a single line from `input`.
///
/// An empty answer or `yes` keeps the selection, anything else is taken as the
/// name of the VM size to use.
pub struct LineConfirmation<R, W> {
    input: R,
    output: W,
}

impl<R: BufRead, W: Write> LineConfirmation<R, W> {
    pub fn new(input: R, output: W) -> Self {
        Self { input, output }
    }
}

impl<R: BufRead, W: Write> SkuConfirmation for LineConfirmation<R, W> {
    fn confirm(&mut self, vm_sku: &str, _tasks_per_node: u32) -> crate::Result<SkuDecision> {
        write!(
            self.output,
            "Confirm with yes if you want to use {vm_sku} for your pool, or type in a new VM SKU: "
        )?;
        self.output.flush()?;

        let mut line = String::new();
        self.input.read_line(&mut line)?;
        let answer = line.trim();
        if answer.is_empty() || answer.eq_ignore_ascii_case("yes") {
            Ok(SkuDecision::Proceed)
        } else if answer.chars().any(|c| c.is_whitespace()) {
            Err(SimScaleError::InvalidConfiguration(format!(
                "`{answer}` is not a valid VM SKU"
            )))
        } else {
            Ok(SkuDecision::Replace(answer.to_string()))
        }
    }
}

/// Confirmation used by the CLI: interactive on a terminal, automatic otherwise.
pub fn create_confirmation(auto_approve: bool) -> Box<dyn SkuConfirmation> {
    if auto_approve || !std::io::stdin().is_terminal() {
        Box::new(AutoApprove)
    } else {
        Box::new(LineConfirmation::new(
            std::io::stdin().lock(),
            std::io::stderr(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use crate::planner::confirm::{LineConfirmation, SkuConfirmation, SkuDecision};

    fn answer(text: &str) -> crate::Result<SkuDecision> {
        let mut output = Vec::new();
        let mut confirmation = LineConfirmation::new(text.as_bytes(), &mut output);
        confirmation.confirm("Standard_E8s_v3", 10)
    }

    #[test]
    fn confirm_with_yes() {
        assert_eq!(answer("yes\n").unwrap(), SkuDecision::Proceed);
        assert_eq!(answer("YES\n").unwrap(), SkuDecision::Proceed);
    }

    #[test]
    fn confirm_with_empty_line() {
        assert_eq!(answer("\n").unwrap(), SkuDecision::Proceed);
        assert_eq!(answer("").unwrap(), SkuDecision::Proceed);
    }

    #[test]
    fn replace_sku() {
        assert_eq!(
            answer("Standard_D4s_v3\n").unwrap(),
            SkuDecision::Replace("Standard_D4s_v3".to_string())
        );
    }

    #[test]
    fn reject_garbage() {
        assert!(answer("no thanks\n").is_err());
    }

    #[test]
    fn prompt_mentions_sku() {
        let mut output = Vec::new();
        LineConfirmation::new("yes\n".as_bytes(), &mut output)
            .confirm("Standard_E8s_v3", 10)
            .unwrap();
        let prompt = String::from_utf8(output).unwrap();
        assert!(prompt.contains("Standard_E8s_v3"));
    }
}
