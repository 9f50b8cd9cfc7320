//! Command units and the shared machinery that splits them at the
//! parameter ceiling.

use sqlbulk_core::{
    BulkOperation, EntityProfile, MAX_PARAMETERS_PER_COMMAND, Parameter, PropertyProfile,
    parameter_name, quote_ident,
};

use crate::error::{SqlGenerationError, SqlGenerationErrorKind};

/// One generated command: text, bound parameters, and how many input
/// elements it covers.
#[derive(Debug, Clone, PartialEq)]
pub struct SqlCommandBuilderResult {
    pub sql: String,
    pub parameters: Vec<Parameter>,
    /// Whether the text ends in a RETURNING clause whose rows map, in
    /// order, onto the unit's elements.
    pub has_returning: bool,
    pub elements_count: usize,
}

/// Accumulates element fragments into units.
///
/// Each unit is `header + fragment (separator fragment)* + trailer`. A new
/// unit starts whenever the next element would push the bound parameter
/// count past the ceiling, or the unit already holds `max_elements`.
#[derive(Debug)]
pub(crate) struct UnitWriter {
    operation: BulkOperation,
    header: String,
    separator: &'static str,
    trailer: String,
    has_returning: bool,
    max_parameters: usize,
    max_elements: Option<usize>,
    body: String,
    parameters: Vec<Parameter>,
    elements: usize,
    units: Vec<SqlCommandBuilderResult>,
}

impl UnitWriter {
    pub(crate) fn new(
        operation: BulkOperation,
        header: String,
        separator: &'static str,
        trailer: String,
        has_returning: bool,
    ) -> Self {
        Self {
            operation,
            header,
            separator,
            trailer,
            has_returning,
            max_parameters: MAX_PARAMETERS_PER_COMMAND,
            max_elements: None,
            body: String::new(),
            parameters: Vec::new(),
            elements: 0,
            units: Vec::new(),
        }
    }

    /// Cap the number of elements per unit (IN-list members).
    pub(crate) fn max_elements(mut self, max: usize) -> Self {
        self.max_elements = Some(max);
        self
    }

    #[cfg(test)]
    pub(crate) fn max_parameters(mut self, max: usize) -> Self {
        self.max_parameters = max;
        self
    }

    /// Make room for an element needing `needed` bound parameters and
    /// return its index within the unit it will land in.
    pub(crate) fn reserve(
        &mut self,
        needed: usize,
        input_index: usize,
    ) -> Result<usize, SqlGenerationError> {
        if needed > self.max_parameters {
            let mut err = SqlGenerationError::new(
                self.operation,
                SqlGenerationErrorKind::ParameterCeiling,
                format!(
                    "one element needs {} bound parameters, more than the {} a command may carry",
                    needed, self.max_parameters
                ),
            );
            err.element_index = Some(input_index);
            return Err(err);
        }
        let params_full = self.parameters.len() + needed > self.max_parameters;
        let elements_full = self.max_elements.is_some_and(|max| self.elements >= max);
        if self.elements > 0 && (params_full || elements_full) {
            self.close();
        }
        Ok(self.elements)
    }

    /// Append a rendered element to the current unit.
    pub(crate) fn push(&mut self, fragment: &str, parameters: Vec<Parameter>) {
        if self.elements > 0 {
            self.body.push_str(self.separator);
        }
        self.body.push_str(fragment);
        self.parameters.extend(parameters);
        self.elements += 1;
    }

    fn close(&mut self) {
        let mut sql =
            String::with_capacity(self.header.len() + self.body.len() + self.trailer.len());
        sql.push_str(&self.header);
        sql.push_str(&self.body);
        sql.push_str(&self.trailer);
        tracing::trace!(
            operation = %self.operation,
            elements = self.elements,
            parameters = self.parameters.len(),
            sql = %sql,
            "Closed command unit"
        );
        self.units.push(SqlCommandBuilderResult {
            sql,
            parameters: std::mem::take(&mut self.parameters),
            has_returning: self.has_returning,
            elements_count: self.elements,
        });
        self.body.clear();
        self.elements = 0;
    }

    pub(crate) fn finish(mut self) -> Vec<SqlCommandBuilderResult> {
        if self.elements > 0 {
            self.close();
        }
        self.units
    }
}

/// Non-null elements with their position in the input.
pub(crate) fn present<'a, T>(
    operation: BulkOperation,
    elements: &'a [Option<&'a T>],
) -> Result<Vec<(usize, &'a T)>, SqlGenerationError> {
    let present: Vec<_> = elements
        .iter()
        .enumerate()
        .filter_map(|(i, e)| e.map(|e| (i, e)))
        .collect();
    if present.is_empty() {
        return Err(SqlGenerationError::new(
            operation,
            SqlGenerationErrorKind::EmptyInput,
            "no elements to operate on",
        ));
    }
    Ok(present)
}

/// Render one property value of one element: a parameter name (pushing
/// the parameter) for bound properties, literal text otherwise.
pub(crate) fn render_value<T>(
    operation: BulkOperation,
    property: &PropertyProfile<T>,
    element: &T,
    input_index: usize,
    unit_index: usize,
    parameters: &mut Vec<Parameter>,
) -> Result<String, SqlGenerationError> {
    let value = property.get_value(element);
    if property.is_dynamically_invoked() {
        let name = parameter_name(property.parameter_stem(), unit_index);
        parameters.push(Parameter {
            name: name.clone(),
            value,
        });
        return Ok(name);
    }
    value.to_inline_literal().ok_or_else(|| {
        SqlGenerationError::new(
            operation,
            SqlGenerationErrorKind::ElementFailure,
            format!(
                "{} value cannot be rendered as an inline literal",
                value.type_name()
            ),
        )
        .at(input_index, property.name())
    })
}

/// Number of bound parameters one element needs for `properties`.
pub(crate) fn bound_count<'a, T: 'a>(
    properties: impl IntoIterator<Item = &'a PropertyProfile<T>>,
) -> usize {
    properties
        .into_iter()
        .filter(|p| p.is_dynamically_invoked())
        .count()
}

/// ` returning "a", "b";` for the flagged columns, or `;`.
pub(crate) fn returning_clause<T>(
    profile: &EntityProfile<T>,
    flagged: impl Fn(&PropertyProfile<T>) -> bool,
) -> (String, bool) {
    let mut columns: Vec<String> = Vec::new();
    for property in profile.properties().iter().filter(|p| flagged(p)) {
        let quoted = quote_ident(property.column_name());
        if !columns.contains(&quoted) {
            columns.push(quoted);
        }
    }
    if columns.is_empty() {
        (";".to_string(), false)
    } else {
        (format!(" returning {};", columns.join(", ")), true)
    }
}
