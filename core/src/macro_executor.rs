//! The macro interpreter: parameters, `${var}` substitution, conditions,
//! loops, and method-call short-hands over the input and selector
//! primitives.
//!
//! Execution is serialized per executor instance; concurrent `execute`
//! calls queue on the internal lock. The deadline is checked before every
//! action and inside wait loops, and exceeding it is an internal
//! timeout (the cause is ours, not the client's cancellation).

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::debug;

use crate::element_registry::ElementRegistry;
use crate::error::AutomationError;
use crate::error::Result;
use crate::error::reason;
use crate::input;
use crate::platform::SystemOperations;
use crate::resource_name::ApplicationScope;
use crate::selector::parse_selector;

use macos_use_proto::macosusesdk::v1::InputAction;
use macos_use_proto::macosusesdk::v1::LogicalOperator;
use macos_use_proto::macosusesdk::v1::Macro;
use macos_use_proto::macosusesdk::v1::MacroAction;
use macos_use_proto::macosusesdk::v1::MacroCondition;
use macos_use_proto::macosusesdk::v1::assign_action;
use macos_use_proto::macosusesdk::v1::for_each_source;
use macos_use_proto::macosusesdk::v1::input_action;
use macos_use_proto::macosusesdk::v1::loop_action;
use macos_use_proto::macosusesdk::v1::macro_action;
use macos_use_proto::macosusesdk::v1::macro_condition;
use macos_use_proto::macosusesdk::v1::wait_action;

const CONDITION_POLL_INTERVAL: Duration = Duration::from_millis(500);
const DEFAULT_CONDITION_TIMEOUT: Duration = Duration::from_secs(30);
const FOR_EACH_ELEMENT_LIMIT: usize = 100;

/// Ephemeral per-execution state.
pub struct MacroContext {
    pub variables: HashMap<String, String>,
    pub parameters: HashMap<String, String>,
    pub scope: ApplicationScope,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MacroOutcome {
    pub actions_executed: u32,
    pub variables: HashMap<String, String>,
}

pub struct MacroExecutor {
    system: Arc<dyn SystemOperations>,
    elements: Arc<ElementRegistry>,
    exec_lock: Mutex<()>,
}

/// Replaces `${name}` tokens with, in order, a variable then a parameter;
/// unknown names are left intact.
pub fn substitute(text: &str, context: &MacroContext) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(start) = rest.find("${") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        match after.find('}') {
            Some(end) => {
                let name = &after[..end];
                match context
                    .variables
                    .get(name)
                    .or_else(|| context.parameters.get(name))
                {
                    Some(value) => out.push_str(value),
                    None => {
                        out.push_str("${");
                        out.push_str(name);
                        out.push('}');
                    }
                }
                rest = &after[end + 1..];
            }
            None => {
                // Unterminated token: emit verbatim.
                out.push_str(&rest[start..]);
                rest = "";
            }
        }
    }
    out.push_str(rest);
    out
}

/// Splits a literal for-each source: newline-delimited when any newline is
/// present, comma-delimited otherwise. Entries are trimmed; empties are
/// skipped.
fn split_values(values: &str) -> Vec<String> {
    let parts: Vec<&str> = if values.contains('\n') {
        values.split('\n').collect()
    } else {
        values.split(',').collect()
    };
    parts
        .into_iter()
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(str::to_string)
        .collect()
}

fn deadline_exceeded() -> AutomationError {
    AutomationError::internal(reason::TIMEOUT, "macro deadline exceeded")
}

impl MacroExecutor {
    pub fn new(system: Arc<dyn SystemOperations>, elements: Arc<ElementRegistry>) -> Self {
        Self {
            system,
            elements,
            exec_lock: Mutex::new(()),
        }
    }

    /// Runs the macro to completion. Missing required parameters fail
    /// before any action runs; declared defaults fill the gaps.
    pub async fn execute(
        &self,
        definition: &Macro,
        parameters: HashMap<String, String>,
        scope: ApplicationScope,
        timeout: Duration,
    ) -> Result<MacroOutcome> {
        let _serialized = self.exec_lock.lock().await;

        let mut resolved = parameters;
        for declared in &definition.parameters {
            if resolved.contains_key(&declared.name) {
                continue;
            }
            if !declared.default_value.is_empty() {
                resolved.insert(declared.name.clone(), declared.default_value.clone());
            } else if declared.required {
                return Err(AutomationError::invalid_argument_with(
                    reason::REQUIRED_FIELD_MISSING,
                    format!("required macro parameter {:?} not provided", declared.name),
                    [("field", format!("parameters.{}", declared.name))],
                ));
            }
        }

        let mut context = MacroContext {
            variables: HashMap::new(),
            parameters: resolved,
            scope,
        };
        let deadline = Instant::now() + timeout;

        debug!(
            "executing macro {} ({} actions)",
            definition.name,
            definition.actions.len()
        );
        let actions_executed = self
            .run_actions(&mut context, &definition.actions, deadline)
            .await?;
        Ok(MacroOutcome {
            actions_executed,
            variables: context.variables,
        })
    }

    fn run_actions<'a>(
        &'a self,
        context: &'a mut MacroContext,
        actions: &'a [MacroAction],
        deadline: Instant,
    ) -> Pin<Box<dyn Future<Output = Result<u32>> + Send + 'a>> {
        Box::pin(async move {
            let mut executed = 0u32;
            for action in actions {
                if Instant::now() >= deadline {
                    return Err(deadline_exceeded());
                }
                executed += self.run_action(context, action, deadline).await?;
            }
            Ok(executed)
        })
    }

    async fn run_action(
        &self,
        context: &mut MacroContext,
        action: &MacroAction,
        deadline: Instant,
    ) -> Result<u32> {
        let kind = action
            .kind
            .as_ref()
            .ok_or_else(|| AutomationError::required_field("action"))?;
        match kind {
            macro_action::Kind::Input(input_action) => {
                let normalized = self.normalize_input(context, input_action);
                input::validate_action(&normalized)?;
                input::perform_action(&self.system, &normalized).await?;
                Ok(1)
            }
            macro_action::Kind::Wait(wait) => {
                match wait
                    .kind
                    .as_ref()
                    .ok_or_else(|| AutomationError::required_field("wait"))?
                {
                    wait_action::Kind::Duration(seconds) => {
                        if !seconds.is_finite() || *seconds < 0.0 {
                            return Err(AutomationError::invalid_argument(
                                reason::INVALID_ACTION,
                                format!("wait duration must be non-negative, got {seconds}"),
                            ));
                        }
                        tokio::time::sleep(Duration::from_secs_f64(*seconds)).await;
                    }
                    wait_action::Kind::Condition(condition_wait) => {
                        let condition = condition_wait
                            .condition
                            .as_ref()
                            .ok_or_else(|| AutomationError::required_field("wait.condition"))?;
                        let timeout = if condition_wait.timeout > 0.0 {
                            Duration::from_secs_f64(condition_wait.timeout)
                        } else {
                            DEFAULT_CONDITION_TIMEOUT
                        };
                        self.wait_for_condition(context, condition, timeout, deadline)
                            .await?;
                    }
                }
                Ok(1)
            }
            macro_action::Kind::Conditional(conditional) => {
                let condition = conditional
                    .condition
                    .as_ref()
                    .ok_or_else(|| AutomationError::required_field("conditional.condition"))?;
                let branch = if self.eval_condition(context, condition).await? {
                    &conditional.then_actions
                } else {
                    &conditional.else_actions
                };
                Ok(1 + self.run_actions(context, branch, deadline).await?)
            }
            macro_action::Kind::LoopAction(loop_action) => {
                self.run_loop(context, loop_action, deadline).await
            }
            macro_action::Kind::Assign(assign) => {
                self.run_assign(context, assign)?;
                Ok(1)
            }
            macro_action::Kind::MethodCall(call) => {
                self.run_method_call(context, &call.method, &call.arguments)
                    .await?;
                Ok(1)
            }
        }
    }

    /// Substitutes `${var}` tokens in text-typing payloads; other input
    /// kinds pass through untouched.
    fn normalize_input(&self, context: &MacroContext, action: &InputAction) -> InputAction {
        match &action.kind {
            Some(input_action::Kind::TypeText(type_text)) => InputAction {
                kind: Some(input_action::Kind::TypeText(
                    macos_use_proto::macosusesdk::v1::TypeTextAction {
                        text: substitute(&type_text.text, context),
                    },
                )),
            },
            _ => action.clone(),
        }
    }

    async fn run_loop(
        &self,
        context: &mut MacroContext,
        action: &macos_use_proto::macosusesdk::v1::LoopAction,
        deadline: Instant,
    ) -> Result<u32> {
        let kind = action
            .kind
            .as_ref()
            .ok_or_else(|| AutomationError::required_field("loop"))?;
        let mut executed = 1u32;
        match kind {
            loop_action::Kind::Count(count) => {
                for _ in 0..(*count).max(0) {
                    if Instant::now() >= deadline {
                        return Err(deadline_exceeded());
                    }
                    executed += self
                        .run_actions(context, &action.actions, deadline)
                        .await?;
                }
            }
            loop_action::Kind::WhileCondition(condition) => loop {
                if Instant::now() >= deadline {
                    return Err(deadline_exceeded());
                }
                if !self.eval_condition(context, condition).await? {
                    break;
                }
                executed += self
                    .run_actions(context, &action.actions, deadline)
                    .await?;
            },
            loop_action::Kind::ForEach(for_each) => {
                if for_each.item_variable.is_empty() {
                    return Err(AutomationError::required_field("for_each.item_variable"));
                }
                let items = self.resolve_for_each_items(context, for_each).await?;
                for item in items {
                    if Instant::now() >= deadline {
                        return Err(deadline_exceeded());
                    }
                    context
                        .variables
                        .insert(for_each.item_variable.clone(), item);
                    executed += self
                        .run_actions(context, &action.actions, deadline)
                        .await?;
                }
            }
        }
        Ok(executed)
    }

    async fn resolve_for_each_items(
        &self,
        context: &MacroContext,
        for_each: &macos_use_proto::macosusesdk::v1::ForEachSource,
    ) -> Result<Vec<String>> {
        let source = for_each
            .source
            .as_ref()
            .ok_or_else(|| AutomationError::required_field("for_each.source"))?;
        match source {
            for_each_source::Source::ElementSelector(selector) => {
                let query = parse_selector(&substitute(selector, context))?;
                let found = self
                    .system
                    .query_elements(context.scope.pid(), &query, FOR_EACH_ELEMENT_LIMIT)
                    .await?;
                let mut ids = Vec::with_capacity(found.len());
                for element in found {
                    let id = ElementRegistry::generate_id();
                    let pid = context.scope.pid().unwrap_or_default();
                    let mut record = crate::element_registry::new_element(pid, &id);
                    record.role = element.role;
                    record.title = element.title;
                    record.bounds = element.bounds.map(crate::convert::rect_to_proto);
                    record.attributes = element.attributes;
                    self.elements.register(record, Some(element.token)).await;
                    ids.push(id);
                }
                Ok(ids)
            }
            for_each_source::Source::WindowTitlePattern(pattern) => {
                let pattern = substitute(pattern, context);
                let windows = self.system.list_windows(context.scope.pid()).await?;
                Ok(windows
                    .into_iter()
                    .map(|window| window.title)
                    .filter(|title| title.contains(&pattern))
                    .collect())
            }
            for_each_source::Source::Values(values) => {
                Ok(split_values(&substitute(values, context)))
            }
        }
    }

    fn run_assign(
        &self,
        context: &mut MacroContext,
        assign: &macos_use_proto::macosusesdk::v1::AssignAction,
    ) -> Result<()> {
        if assign.variable.is_empty() {
            return Err(AutomationError::required_field("assign.variable"));
        }
        let source = assign
            .source
            .as_ref()
            .ok_or_else(|| AutomationError::required_field("assign.source"))?;
        let value = match source {
            assign_action::Source::Literal(literal) => literal.clone(),
            assign_action::Source::Parameter(parameter) => context
                .parameters
                .get(parameter)
                .cloned()
                .unwrap_or_default(),
            assign_action::Source::Expression(expression) => substitute(expression, context),
            assign_action::Source::ElementAttribute(_) => {
                // Declared in the schema but unimplemented; reject rather
                // than silently assign nothing.
                return Err(AutomationError::invalid_argument(
                    reason::INVALID_ACTION,
                    "element-attribute assignment is not supported",
                ));
            }
        };
        context.variables.insert(assign.variable.clone(), value);
        Ok(())
    }

    async fn run_method_call(
        &self,
        context: &mut MacroContext,
        method: &str,
        arguments: &HashMap<String, String>,
    ) -> Result<()> {
        match method {
            "ClickElement" => {
                let element_id = arguments.get("elementId").ok_or_else(|| {
                    AutomationError::required_field("arguments.elementId")
                })?;
                let element = self.elements.get(&substitute(element_id, context)).await?;
                let bounds = element.bounds.as_ref().ok_or_else(|| {
                    AutomationError::failed_precondition(
                        reason::ELEMENT_WITHOUT_BOUNDS,
                        format!("element {} has no bounds", element.element_id),
                    )
                })?;
                let center = crate::convert::rect_from_proto(bounds).center();
                self.system
                    .post_click(center, crate::platform::MouseButtonKind::Left, 1)
                    .await?;
                Ok(())
            }
            "TypeText" => {
                let text = arguments
                    .get("text")
                    .ok_or_else(|| AutomationError::required_field("arguments.text"))?;
                self.system.type_text(&substitute(text, context)).await?;
                Ok(())
            }
            other => Err(input::invalid_unknown_method(other)),
        }
    }

    async fn wait_for_condition(
        &self,
        context: &MacroContext,
        condition: &MacroCondition,
        timeout: Duration,
        deadline: Instant,
    ) -> Result<()> {
        let wait_deadline = (Instant::now() + timeout).min(deadline);
        loop {
            if self.eval_condition(context, condition).await? {
                return Ok(());
            }
            if Instant::now() >= wait_deadline {
                return Err(AutomationError::internal(
                    reason::TIMEOUT,
                    "condition wait timed out",
                ));
            }
            tokio::time::sleep(CONDITION_POLL_INTERVAL).await;
        }
    }

    fn eval_condition<'a>(
        &'a self,
        context: &'a MacroContext,
        condition: &'a MacroCondition,
    ) -> Pin<Box<dyn Future<Output = Result<bool>> + Send + 'a>> {
        Box::pin(async move {
            let kind = condition
                .kind
                .as_ref()
                .ok_or_else(|| AutomationError::required_field("condition"))?;
            match kind {
                macro_condition::Kind::ElementExists(selector) => {
                    let query = parse_selector(&substitute(selector, context))?;
                    let found = self
                        .system
                        .query_elements(context.scope.pid(), &query, 1)
                        .await?;
                    Ok(!found.is_empty())
                }
                macro_condition::Kind::WindowExists(pattern) => {
                    let pattern = substitute(pattern, context);
                    let windows = self.system.list_windows(context.scope.pid()).await?;
                    Ok(windows.iter().any(|window| window.title.contains(&pattern)))
                }
                macro_condition::Kind::ApplicationRunning(name) => {
                    let pid = self
                        .system
                        .running_application(&substitute(name, context))
                        .await?;
                    Ok(pid.is_some())
                }
                macro_condition::Kind::VariableEquals(variable_equals) => {
                    let actual = context
                        .variables
                        .get(&variable_equals.variable)
                        .or_else(|| context.parameters.get(&variable_equals.variable));
                    Ok(actual.map(String::as_str) == Some(variable_equals.value.as_str()))
                }
                macro_condition::Kind::Compound(compound) => {
                    match compound.operator() {
                        LogicalOperator::And => {
                            for child in &compound.conditions {
                                if !self.eval_condition(context, child).await? {
                                    return Ok(false);
                                }
                            }
                            Ok(true)
                        }
                        LogicalOperator::Or => {
                            for child in &compound.conditions {
                                if self.eval_condition(context, child).await? {
                                    return Ok(true);
                                }
                            }
                            Ok(false)
                        }
                        LogicalOperator::Not => {
                            if compound.conditions.len() != 1 {
                                return Err(AutomationError::invalid_argument(
                                    reason::INVALID_ACTION,
                                    format!(
                                        "NOT requires exactly one child, got {}",
                                        compound.conditions.len()
                                    ),
                                ));
                            }
                            Ok(!self.eval_condition(context, &compound.conditions[0]).await?)
                        }
                        LogicalOperator::Unspecified => Err(AutomationError::invalid_argument(
                            reason::INVALID_ACTION,
                            "compound condition requires an operator",
                        )),
                    }
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn context_with(
        variables: &[(&str, &str)],
        parameters: &[(&str, &str)],
    ) -> MacroContext {
        MacroContext {
            variables: variables
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            parameters: parameters
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            scope: ApplicationScope::All,
        }
    }

    #[test]
    fn substitution_prefers_variables_then_parameters() {
        let context = context_with(&[("x", "a")], &[("x", "shadowed"), ("y", "b")]);
        assert_eq!(substitute("${x}-${y}-${z}", &context), "a-b-${z}");
    }

    #[test]
    fn substitution_leaves_unterminated_tokens_verbatim() {
        let context = context_with(&[("x", "a")], &[]);
        assert_eq!(substitute("${x} and ${broken", &context), "a and ${broken");
        assert_eq!(substitute("no tokens", &context), "no tokens");
    }

    #[test]
    fn values_split_on_newlines_first_then_commas() {
        assert_eq!(split_values("a,b , c"), vec!["a", "b", "c"]);
        assert_eq!(split_values("a,b\nc\n \n"), vec!["a,b", "c"]);
        assert!(split_values("  ").is_empty());
    }
}
