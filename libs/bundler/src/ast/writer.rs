use serde_json::Value;

use super::node::{with_stack, AstNode, NodeKind};

pub const INDENT: &str = "    ";

/// Pretty-prints compact-JSON AST nodes back into Solidity source.
///
/// Output is normalised rather than byte-identical to the input: four-space indentation, one
/// statement per line, documentation comments left to the caller.
#[derive(Clone, Copy, Debug, Default)]
pub struct SourceWriter {
  /// Print `public`/`internal` on constructors; required before Solidity 0.7.
  constructor_visibility: bool,
}

impl SourceWriter {
  pub fn new() -> Self {
    Self::default()
  }

  /// A writer matching the `pragma solidity` constraint of `unit`.
  pub fn for_source_unit(unit: AstNode<'_>) -> Self {
    let minor = unit
      .nodes_of(NodeKind::PragmaDirective)
      .into_iter()
      .find_map(|pragma| {
        let literals = pragma.strings("literals");
        let (name, rest) = literals.split_first()?;
        (*name == "solidity").then(|| rest.concat())
      })
      .and_then(|constraint| minor_version(&constraint));
    Self {
      constructor_visibility: minor.is_some_and(|minor| minor < 7),
    }
  }

  /// Render any declaration, type name, statement or expression.
  pub fn write(&self, node: AstNode<'_>) -> String {
    with_stack(|| match node.kind() {
      NodeKind::PragmaDirective => self.pragma(node),
      NodeKind::ImportDirective => self.import(node),
      NodeKind::UsingForDirective => self.using_for(node),
      NodeKind::StructDefinition => self.struct_definition(node),
      NodeKind::EnumDefinition => self.enum_definition(node),
      NodeKind::EnumValue => node.name().to_string(),
      NodeKind::UserDefinedValueTypeDefinition => format!(
        "type {} is {};",
        node.name(),
        self.optional(node.child("underlyingType"))
      ),
      NodeKind::ErrorDefinition => format!(
        "error {}{};",
        node.name(),
        self.optional_parameters(node.child("parameters"))
      ),
      NodeKind::EventDefinition => self.event(node),
      NodeKind::FunctionDefinition => self.function(node),
      NodeKind::ModifierDefinition => self.modifier(node),
      NodeKind::ModifierInvocation => self.modifier_invocation(node),
      NodeKind::OverrideSpecifier => self.override_specifier(node),
      NodeKind::InheritanceSpecifier => self.inheritance(node),
      NodeKind::VariableDeclaration if node.bool("stateVariable") => self.state_variable(node),
      NodeKind::VariableDeclaration => self.parameter(node),
      NodeKind::ParameterList => self.parameters(node),
      NodeKind::StructuredDocumentation => self.documentation_node(node),
      NodeKind::ElementaryTypeName
      | NodeKind::UserDefinedTypeName
      | NodeKind::IdentifierPath
      | NodeKind::ArrayTypeName
      | NodeKind::Mapping
      | NodeKind::FunctionTypeName => self.type_name(node),
      kind if is_statement(&kind) => self.statement(node),
      kind if is_yul(&kind) => self.yul(node),
      _ => self.expression(node),
    })
  }

  /// Documentation as carried on a declaration: plain strings are returned verbatim,
  /// `StructuredDocumentation` nodes are printed as `///` lines.
  pub fn documentation(&self, docs: Option<&Value>) -> String {
    match docs {
      Some(Value::String(text)) => text.clone(),
      Some(value) => AstNode::new(value)
        .map(|node| self.documentation_node(node))
        .unwrap_or_default(),
      None => String::new(),
    }
  }

  fn documentation_node(&self, node: AstNode<'_>) -> String {
    node
      .str_or_empty("text")
      .lines()
      .map(|line| format!("///{line}"))
      .collect::<Vec<_>>()
      .join("\n")
  }

  fn optional(&self, node: Option<AstNode<'_>>) -> String {
    node.map(|node| self.write(node)).unwrap_or_default()
  }

  // ---------------------------------------------------------------------------------------------
  // declarations

  fn pragma(&self, node: AstNode<'_>) -> String {
    let literals = node.strings("literals");
    let Some((name, rest)) = literals.split_first() else {
      return String::new();
    };

    let mut value = String::new();
    let mut after_operator = true;
    for token in rest {
      if *token == "||" {
        value.push_str(" || ");
        after_operator = true;
        continue;
      }
      let operator = token.starts_with(['<', '>', '=', '^', '~']);
      if operator && !after_operator {
        value.push(' ');
      }
      value.push_str(token);
      after_operator = operator;
    }

    if value.is_empty() {
      format!("pragma {name};")
    } else {
      format!("pragma {name} {value};")
    }
  }

  fn import(&self, node: AstNode<'_>) -> String {
    let file = node.str("file").or(node.str("absolutePath")).unwrap_or_default();
    let unit_alias = node.str_or_empty("unitAlias");
    if !unit_alias.is_empty() {
      return format!("import \"{}\" as {unit_alias};", escape_string(file));
    }

    let symbols: Vec<String> = node
      .value("symbolAliases")
      .and_then(Value::as_array)
      .map(|aliases| aliases.iter().filter_map(symbol_alias).collect())
      .unwrap_or_default();
    if symbols.is_empty() {
      format!("import \"{}\";", escape_string(file))
    } else {
      format!(
        "import {{ {} }} from \"{}\";",
        symbols.join(", "),
        escape_string(file)
      )
    }
  }

  fn using_for(&self, node: AstNode<'_>) -> String {
    let library = match node.child("libraryName") {
      Some(library) => self.type_name(library),
      None => {
        let entries: Vec<String> = node
          .value("functionList")
          .and_then(Value::as_array)
          .map(|items| items.iter().filter_map(|entry| self.using_entry(entry)).collect())
          .unwrap_or_default();
        format!("{{ {} }}", entries.join(", "))
      }
    };
    let target = node
      .child("typeName")
      .map(|ty| self.type_name(ty))
      .unwrap_or_else(|| "*".to_string());
    let global = if node.bool("global") { " global" } else { "" };
    format!("using {library} for {target}{global};")
  }

  fn using_entry(&self, entry: &Value) -> Option<String> {
    if let Some(function) = entry.get("function").and_then(AstNode::new) {
      return Some(self.type_name(function));
    }
    let definition = entry.get("definition").and_then(AstNode::new)?;
    let operator = entry.get("operator").and_then(Value::as_str)?;
    Some(format!("{} as {operator}", self.type_name(definition)))
  }

  fn struct_definition(&self, node: AstNode<'_>) -> String {
    let members: Vec<String> = node
      .children("members")
      .into_iter()
      .map(|member| format!("{};", self.parameter(member)))
      .collect();
    format!("struct {} {}", node.name(), braced(&members.join("\n")))
  }

  fn enum_definition(&self, node: AstNode<'_>) -> String {
    let members: Vec<&str> = node.children("members").iter().map(|member| member.name()).collect();
    format!("enum {} {{ {} }}", node.name(), members.join(", "))
  }

  fn event(&self, node: AstNode<'_>) -> String {
    let anonymous = if node.bool("anonymous") { " anonymous" } else { "" };
    format!(
      "event {}{}{anonymous};",
      node.name(),
      self.optional_parameters(node.child("parameters"))
    )
  }

  /// `contract`, `interface` or `library`, defaulting to `contract` for older ASTs.
  pub fn contract_kind<'a>(&self, node: AstNode<'a>) -> &'a str {
    node.str("contractKind").unwrap_or("contract")
  }

  pub fn inheritance(&self, node: AstNode<'_>) -> String {
    let base = self.optional(node.child("baseName"));
    match node.value("arguments").and_then(Value::as_array) {
      Some(_) => format!("{base}({})", self.arguments(node, "arguments")),
      None => base,
    }
  }

  fn function(&self, node: AstNode<'_>) -> String {
    let kind = node.str_or_empty("kind");
    let name = node.name();
    let is_constructor = kind == "constructor" || node.bool("isConstructor");

    let mut parts = Vec::new();
    let keyword = match kind {
      "constructor" => "constructor".to_string(),
      "fallback" | "receive" => kind.to_string(),
      // pre-0.4.22 constructors are functions named after the contract
      _ if is_constructor && name.is_empty() => "constructor".to_string(),
      _ if name.is_empty() => "function".to_string(),
      _ => format!("function {name}"),
    };
    parts.push(format!(
      "{keyword}{}",
      self.optional_parameters(node.child("parameters"))
    ));

    let visibility = node.str_or_empty("visibility");
    let show_visibility = if is_constructor {
      self.constructor_visibility
    } else {
      kind != "freeFunction"
    };
    if !visibility.is_empty() && show_visibility {
      parts.push(visibility.to_string());
    }
    if let Some(mutability) = state_mutability(node) {
      parts.push(mutability.to_string());
    }
    if node.bool("virtual") {
      parts.push("virtual".to_string());
    }
    if let Some(overrides) = node.child("overrides") {
      parts.push(self.override_specifier(overrides));
    }
    for modifier in node.children("modifiers") {
      parts.push(self.modifier_invocation(modifier));
    }
    if let Some(returns) = node.child("returnParameters") {
      if !returns.children("parameters").is_empty() {
        parts.push(format!("returns {}", self.parameters(returns)));
      }
    }

    let header = parts.join(" ");
    match node.child("body") {
      Some(body) => format!("{header} {}", self.statement(body)),
      None => format!("{header};"),
    }
  }

  fn modifier(&self, node: AstNode<'_>) -> String {
    let mut parts = vec![format!(
      "modifier {}{}",
      node.name(),
      self.optional_parameters(node.child("parameters"))
    )];
    if node.bool("virtual") {
      parts.push("virtual".to_string());
    }
    if let Some(overrides) = node.child("overrides") {
      parts.push(self.override_specifier(overrides));
    }
    let header = parts.join(" ");
    match node.child("body") {
      Some(body) => format!("{header} {}", self.statement(body)),
      None => format!("{header};"),
    }
  }

  fn modifier_invocation(&self, node: AstNode<'_>) -> String {
    let name = node
      .child("modifierName")
      .map(|name| self.write(name))
      .unwrap_or_default();
    match node.value("arguments").and_then(Value::as_array) {
      Some(_) => format!("{name}({})", self.arguments(node, "arguments")),
      None => name,
    }
  }

  fn override_specifier(&self, node: AstNode<'_>) -> String {
    let overrides: Vec<String> = node
      .children("overrides")
      .into_iter()
      .map(|name| self.type_name(name))
      .collect();
    if overrides.is_empty() {
      "override".to_string()
    } else {
      format!("override({})", overrides.join(", "))
    }
  }

  /// State variable declaration, terminated with `;`.
  pub fn state_variable(&self, node: AstNode<'_>) -> String {
    let mut parts = vec![self.declared_type(node)];
    let visibility = node.str_or_empty("visibility");
    if !visibility.is_empty() {
      parts.push(visibility.to_string());
    }
    if let Some(mutability) = variable_mutability(node) {
      parts.push(mutability.to_string());
    }
    if let Some(overrides) = node.child("overrides") {
      parts.push(self.override_specifier(overrides));
    }
    parts.push(node.name().to_string());
    self.with_initializer(node, parts.join(" "))
  }

  /// File-level constant, terminated with `;`.
  pub fn free_variable(&self, node: AstNode<'_>) -> String {
    let mut parts = vec![self.declared_type(node)];
    if let Some(mutability) = variable_mutability(node) {
      parts.push(mutability.to_string());
    }
    parts.push(node.name().to_string());
    self.with_initializer(node, parts.join(" "))
  }

  fn with_initializer(&self, node: AstNode<'_>, declaration: String) -> String {
    match node.child("value") {
      Some(value) => format!("{declaration} = {};", self.expression(value)),
      None => format!("{declaration};"),
    }
  }

  /// Parameter, struct member or local variable: type, data location, `indexed`, name.
  pub fn parameter(&self, node: AstNode<'_>) -> String {
    let mut parts = vec![self.declared_type(node)];
    match node.str_or_empty("storageLocation") {
      "" | "default" => {}
      location => parts.push(location.to_string()),
    }
    if node.bool("indexed") {
      parts.push("indexed".to_string());
    }
    if !node.name().is_empty() {
      parts.push(node.name().to_string());
    }
    parts.join(" ")
  }

  fn declared_type(&self, node: AstNode<'_>) -> String {
    match node.child("typeName") {
      Some(type_name) => self.type_name(type_name),
      None => "var".to_string(),
    }
  }

  pub fn parameters(&self, node: AstNode<'_>) -> String {
    let parameters: Vec<String> = node
      .children("parameters")
      .into_iter()
      .map(|parameter| self.parameter(parameter))
      .collect();
    format!("({})", parameters.join(", "))
  }

  fn optional_parameters(&self, node: Option<AstNode<'_>>) -> String {
    node
      .map(|list| self.parameters(list))
      .unwrap_or_else(|| "()".to_string())
  }

  // ---------------------------------------------------------------------------------------------
  // type names

  pub fn type_name(&self, node: AstNode<'_>) -> String {
    with_stack(|| match node.kind() {
      NodeKind::ElementaryTypeName => {
        let name = node.name();
        if node.str("stateMutability") == Some("payable") && !name.ends_with("payable") {
          format!("{name} payable")
        } else {
          name.to_string()
        }
      }
      NodeKind::UserDefinedTypeName => {
        if let Some(path) = node.child("pathNode") {
          return path.name().to_string();
        }
        if !node.name().is_empty() {
          return node.name().to_string();
        }
        node
          .value("typeDescriptions")
          .and_then(|descriptions| descriptions.get("typeString"))
          .and_then(Value::as_str)
          .map(strip_type_category)
          .unwrap_or_default()
          .to_string()
      }
      NodeKind::IdentifierPath | NodeKind::Identifier => node.name().to_string(),
      NodeKind::ArrayTypeName => format!(
        "{}[{}]",
        self.optional(node.child("baseType")),
        node
          .child("length")
          .map(|length| self.expression(length))
          .unwrap_or_default()
      ),
      NodeKind::Mapping => {
        let key = self.mapping_side(node, "keyType", "keyName");
        let value = self.mapping_side(node, "valueType", "valueName");
        format!("mapping({key} => {value})")
      }
      NodeKind::FunctionTypeName => {
        let mut parts = vec![format!(
          "function {}",
          self.optional_parameters(node.child("parameterTypes"))
        )];
        match node.str_or_empty("visibility") {
          "" | "internal" => {}
          visibility => parts.push(visibility.to_string()),
        }
        if let Some(mutability) = state_mutability(node) {
          parts.push(mutability.to_string());
        }
        if let Some(returns) = node.child("returnParameterTypes") {
          if !returns.children("parameters").is_empty() {
            parts.push(format!("returns {}", self.parameters(returns)));
          }
        }
        parts.join(" ")
      }
      _ => self.expression(node),
    })
  }

  fn mapping_side(&self, node: AstNode<'_>, type_key: &str, name_key: &str) -> String {
    let ty = self.optional(node.child(type_key));
    match node.str(name_key).filter(|name| !name.is_empty()) {
      Some(name) => format!("{ty} {name}"),
      None => ty,
    }
  }

  // ---------------------------------------------------------------------------------------------
  // statements

  pub fn statement(&self, node: AstNode<'_>) -> String {
    with_stack(|| match node.kind() {
      NodeKind::Block => self.block(node),
      NodeKind::UncheckedBlock => format!("unchecked {}", self.block(node)),
      NodeKind::ExpressionStatement => format!("{};", self.optional_expression(node, "expression")),
      NodeKind::VariableDeclarationStatement => self.variable_statement(node),
      NodeKind::IfStatement => {
        let mut text = format!(
          "if ({}) {}",
          self.optional_expression(node, "condition"),
          self.optional_statement(node.child("trueBody"))
        );
        if let Some(false_body) = node.child("falseBody") {
          text.push_str(" else ");
          text.push_str(&self.statement(false_body));
        }
        text
      }
      NodeKind::ForStatement => {
        let init = node
          .child("initializationExpression")
          .map(|init| self.statement(init).trim_end_matches(';').to_string())
          .unwrap_or_default();
        let condition = self.optional_expression(node, "condition");
        let step = node
          .child("loopExpression")
          .map(|step| self.statement(step).trim_end_matches(';').to_string())
          .unwrap_or_default();
        format!(
          "for ({init}; {condition}; {step}) {}",
          self.optional_statement(node.child("body"))
        )
      }
      NodeKind::WhileStatement => format!(
        "while ({}) {}",
        self.optional_expression(node, "condition"),
        self.optional_statement(node.child("body"))
      ),
      NodeKind::DoWhileStatement => format!(
        "do {} while ({});",
        self.optional_statement(node.child("body")),
        self.optional_expression(node, "condition")
      ),
      NodeKind::Return => match node.child("expression") {
        Some(expression) => format!("return {};", self.expression(expression)),
        None => "return;".to_string(),
      },
      NodeKind::EmitStatement => format!("emit {};", self.optional_expression(node, "eventCall")),
      NodeKind::RevertStatement => format!("revert {};", self.optional_expression(node, "errorCall")),
      NodeKind::TryStatement => self.try_statement(node),
      NodeKind::Break => "break;".to_string(),
      NodeKind::Continue => "continue;".to_string(),
      NodeKind::Throw => "throw;".to_string(),
      NodeKind::PlaceholderStatement => "_;".to_string(),
      NodeKind::InlineAssembly => self.inline_assembly(node),
      _ => format!("{};", self.expression(node)),
    })
  }

  fn optional_statement(&self, node: Option<AstNode<'_>>) -> String {
    node
      .map(|node| self.statement(node))
      .unwrap_or_else(|| ";".to_string())
  }

  fn block(&self, node: AstNode<'_>) -> String {
    let statements: Vec<String> = node
      .children("statements")
      .into_iter()
      .map(|statement| self.statement(statement))
      .collect();
    braced(&statements.join("\n"))
  }

  fn variable_statement(&self, node: AstNode<'_>) -> String {
    let declarations = node.optional_children("declarations");
    let declared = match declarations.as_slice() {
      [Some(single)] => self.parameter(*single),
      _ => {
        let parts: Vec<String> = declarations
          .iter()
          .map(|declaration| declaration.map(|d| self.parameter(d)).unwrap_or_default())
          .collect();
        format!("({})", parts.join(", "))
      }
    };
    match node.child("initialValue") {
      Some(value) => format!("{declared} = {};", self.expression(value)),
      None => format!("{declared};"),
    }
  }

  fn try_statement(&self, node: AstNode<'_>) -> String {
    let mut text = format!("try {}", self.optional_expression(node, "externalCall"));
    for (index, clause) in node.children("clauses").into_iter().enumerate() {
      let parameters = clause
        .child("parameters")
        .filter(|list| !list.children("parameters").is_empty())
        .map(|list| self.parameters(list));
      let block = self.optional_statement(clause.child("block"));
      if index == 0 {
        if let Some(parameters) = parameters {
          text.push_str(&format!(" returns {parameters}"));
        }
        text.push_str(&format!(" {block}"));
      } else {
        text.push_str(" catch ");
        text.push_str(clause.str_or_empty("errorName"));
        if let Some(parameters) = parameters {
          text.push_str(&parameters);
          text.push(' ');
        }
        text.push_str(&block);
      }
    }
    text
  }

  fn inline_assembly(&self, node: AstNode<'_>) -> String {
    let flags: Vec<String> = node
      .strings("flags")
      .into_iter()
      .map(|flag| format!("\"{}\"", escape_string(flag)))
      .collect();
    let prefix = if flags.is_empty() {
      "assembly".to_string()
    } else {
      format!("assembly ({})", flags.join(", "))
    };
    if let Some(body) = node.child("AST") {
      return format!("{prefix} {}", self.yul(body));
    }
    // pre-0.6 ASTs only carry the assembly text
    format!("{prefix} {}", node.str("operations").unwrap_or("{}").trim())
  }

  // ---------------------------------------------------------------------------------------------
  // expressions

  pub fn expression(&self, node: AstNode<'_>) -> String {
    with_stack(|| match node.kind() {
      NodeKind::Identifier => node.name().to_string(),
      NodeKind::Literal => literal(node),
      NodeKind::Assignment | NodeKind::BinaryOperation => {
        let (left, right) = if node.is(NodeKind::Assignment) {
          ("leftHandSide", "rightHandSide")
        } else {
          ("leftExpression", "rightExpression")
        };
        format!(
          "{} {} {}",
          self.optional_expression(node, left),
          node.str_or_empty("operator"),
          self.optional_expression(node, right)
        )
      }
      NodeKind::UnaryOperation => {
        let operator = node.str_or_empty("operator");
        let operand = self.optional_expression(node, "subExpression");
        if !node.bool("prefix") {
          format!("{operand}{operator}")
        } else if operator == "delete" {
          format!("delete {operand}")
        } else {
          format!("{operator}{operand}")
        }
      }
      NodeKind::Conditional => format!(
        "{} ? {} : {}",
        self.optional_expression(node, "condition"),
        self.optional_expression(node, "trueExpression"),
        self.optional_expression(node, "falseExpression")
      ),
      NodeKind::FunctionCall => format!(
        "{}({})",
        self.optional_expression(node, "expression"),
        self.call_arguments(node, "arguments")
      ),
      NodeKind::FunctionCallOptions => {
        let names = node.strings("names");
        let options: Vec<String> = node
          .children("options")
          .into_iter()
          .zip(names)
          .map(|(option, name)| format!("{name}: {}", self.expression(option)))
          .collect();
        format!(
          "{}{{{}}}",
          self.optional_expression(node, "expression"),
          options.join(", ")
        )
      }
      NodeKind::MemberAccess => format!(
        "{}.{}",
        self.optional_expression(node, "expression"),
        node.str_or_empty("memberName")
      ),
      NodeKind::IndexAccess => format!(
        "{}[{}]",
        self.optional_expression(node, "baseExpression"),
        self.optional_expression(node, "indexExpression")
      ),
      NodeKind::IndexRangeAccess => format!(
        "{}[{}:{}]",
        self.optional_expression(node, "baseExpression"),
        self.optional_expression(node, "startExpression"),
        self.optional_expression(node, "endExpression")
      ),
      NodeKind::NewExpression => format!(
        "new {}",
        node
          .child("typeName")
          .map(|ty| self.type_name(ty))
          .unwrap_or_default()
      ),
      NodeKind::ElementaryTypeNameExpression => match node.child("typeName") {
        Some(type_name) => self.type_name(type_name),
        None => node.str_or_empty("typeName").to_string(),
      },
      NodeKind::TupleExpression => {
        let components: Vec<String> = node
          .optional_children("components")
          .into_iter()
          .map(|component| component.map(|c| self.expression(c)).unwrap_or_default())
          .collect();
        if node.bool("isInlineArray") {
          format!("[{}]", components.join(", "))
        } else {
          format!("({})", components.join(", "))
        }
      }
      NodeKind::ElementaryTypeName
      | NodeKind::UserDefinedTypeName
      | NodeKind::IdentifierPath
      | NodeKind::ArrayTypeName
      | NodeKind::Mapping
      | NodeKind::FunctionTypeName => self.type_name(node),
      other => {
        tracing::debug!(node_type = ?other, "no source rendering for node");
        String::new()
      }
    })
  }

  fn optional_expression(&self, node: AstNode<'_>, key: &str) -> String {
    node
      .child(key)
      .map(|child| self.expression(child))
      .unwrap_or_default()
  }

  fn arguments(&self, node: AstNode<'_>, key: &str) -> String {
    node
      .children(key)
      .into_iter()
      .map(|argument| self.expression(argument))
      .collect::<Vec<_>>()
      .join(", ")
  }

  /// Positional `a, b` or named `{x: a, y: b}` call arguments.
  fn call_arguments(&self, node: AstNode<'_>, key: &str) -> String {
    let names = node.strings("names");
    if names.is_empty() {
      return self.arguments(node, key);
    }
    let named: Vec<String> = node
      .children(key)
      .into_iter()
      .zip(names)
      .map(|(argument, name)| format!("{name}: {}", self.expression(argument)))
      .collect();
    format!("{{{}}}", named.join(", "))
  }

  // ---------------------------------------------------------------------------------------------
  // yul

  pub fn yul(&self, node: AstNode<'_>) -> String {
    with_stack(|| match node.kind() {
      NodeKind::YulBlock => {
        let statements: Vec<String> = node
          .children("statements")
          .into_iter()
          .map(|statement| self.yul(statement))
          .collect();
        braced(&statements.join("\n"))
      }
      NodeKind::YulVariableDeclaration => {
        let variables = self.yul_list(node, "variables");
        match node.child("value") {
          Some(value) => format!("let {variables} := {}", self.yul(value)),
          None => format!("let {variables}"),
        }
      }
      NodeKind::YulAssignment => format!(
        "{} := {}",
        self.yul_list(node, "variableNames"),
        self.optional_yul(node, "value")
      ),
      NodeKind::YulExpressionStatement => self.optional_yul(node, "expression"),
      NodeKind::YulFunctionCall => format!(
        "{}({})",
        self.optional_yul(node, "functionName"),
        self.yul_list(node, "arguments")
      ),
      NodeKind::YulIdentifier => node.name().to_string(),
      NodeKind::YulTypedName => match node.str_or_empty("type") {
        "" => node.name().to_string(),
        ty => format!("{}:{ty}", node.name()),
      },
      NodeKind::YulLiteral => yul_literal(node),
      NodeKind::YulIf => format!(
        "if {} {}",
        self.optional_yul(node, "condition"),
        self.optional_yul(node, "body")
      ),
      NodeKind::YulSwitch => {
        let mut lines = vec![format!("switch {}", self.optional_yul(node, "expression"))];
        lines.extend(node.children("cases").into_iter().map(|case| self.yul(case)));
        lines.join("\n")
      }
      NodeKind::YulCase => {
        let body = self.optional_yul(node, "body");
        match node.value("value") {
          Some(Value::String(value)) if value == "default" => format!("default {body}"),
          _ => format!("case {} {body}", self.optional_yul(node, "value")),
        }
      }
      NodeKind::YulForLoop => format!(
        "for {} {} {} {}",
        self.optional_yul(node, "pre"),
        self.optional_yul(node, "condition"),
        self.optional_yul(node, "post"),
        self.optional_yul(node, "body")
      ),
      NodeKind::YulFunctionDefinition => {
        let returns = self.yul_list(node, "returnVariables");
        let returns = if returns.is_empty() {
          String::new()
        } else {
          format!(" -> {returns}")
        };
        format!(
          "function {}({}){returns} {}",
          node.name(),
          self.yul_list(node, "parameters"),
          self.optional_yul(node, "body")
        )
      }
      NodeKind::YulBreak => "break".to_string(),
      NodeKind::YulContinue => "continue".to_string(),
      NodeKind::YulLeave => "leave".to_string(),
      other => {
        tracing::debug!(node_type = ?other, "no yul rendering for node");
        String::new()
      }
    })
  }

  fn optional_yul(&self, node: AstNode<'_>, key: &str) -> String {
    node
      .child(key)
      .map(|child| self.yul(child))
      .unwrap_or_default()
  }

  fn yul_list(&self, node: AstNode<'_>, key: &str) -> String {
    node
      .children(key)
      .into_iter()
      .map(|item| self.yul(item))
      .collect::<Vec<_>>()
      .join(", ")
  }
}

fn is_statement(kind: &NodeKind) -> bool {
  matches!(
    kind,
    NodeKind::Block
      | NodeKind::UncheckedBlock
      | NodeKind::ExpressionStatement
      | NodeKind::VariableDeclarationStatement
      | NodeKind::IfStatement
      | NodeKind::ForStatement
      | NodeKind::WhileStatement
      | NodeKind::DoWhileStatement
      | NodeKind::Return
      | NodeKind::EmitStatement
      | NodeKind::RevertStatement
      | NodeKind::TryStatement
      | NodeKind::Break
      | NodeKind::Continue
      | NodeKind::Throw
      | NodeKind::PlaceholderStatement
      | NodeKind::InlineAssembly
  )
}

fn is_yul(kind: &NodeKind) -> bool {
  matches!(
    kind,
    NodeKind::YulBlock
      | NodeKind::YulVariableDeclaration
      | NodeKind::YulAssignment
      | NodeKind::YulExpressionStatement
      | NodeKind::YulFunctionCall
      | NodeKind::YulIdentifier
      | NodeKind::YulLiteral
      | NodeKind::YulTypedName
      | NodeKind::YulIf
      | NodeKind::YulSwitch
      | NodeKind::YulCase
      | NodeKind::YulForLoop
      | NodeKind::YulFunctionDefinition
      | NodeKind::YulBreak
      | NodeKind::YulContinue
      | NodeKind::YulLeave
  )
}

/// `{}` for empty bodies, otherwise the body on its own indented lines.
fn braced(body: &str) -> String {
  if body.trim().is_empty() {
    "{}".to_string()
  } else {
    format!("{{\n{}\n}}", indent(body))
  }
}

pub fn indent(text: &str) -> String {
  text
    .lines()
    .map(|line| {
      if line.is_empty() {
        String::new()
      } else {
        format!("{INDENT}{line}")
      }
    })
    .collect::<Vec<_>>()
    .join("\n")
}

/// Minor number of the first `0.x` version in a pragma constraint such as `>=0.6.0 <0.9.0`.
fn minor_version(constraint: &str) -> Option<u64> {
  let start = constraint.find("0.")? + 2;
  let digits: String = constraint[start..]
    .chars()
    .take_while(char::is_ascii_digit)
    .collect();
  digits.parse().ok()
}

fn state_mutability<'a>(node: AstNode<'a>) -> Option<&'a str> {
  match node.str("stateMutability") {
    Some("nonpayable") => None,
    Some(mutability) => Some(mutability),
    // ASTs older than 0.4.16 only carry flags
    None if node.bool("payable") => Some("payable"),
    None if node.bool("constant") => Some("view"),
    None => None,
  }
}

fn variable_mutability<'a>(node: AstNode<'a>) -> Option<&'a str> {
  match node.str("mutability") {
    Some("constant") => Some("constant"),
    Some("immutable") => Some("immutable"),
    Some(_) => None,
    None if node.bool("constant") => Some("constant"),
    None => None,
  }
}

fn symbol_alias(alias: &Value) -> Option<String> {
  let foreign = alias.get("foreign").and_then(AstNode::new)?;
  let local = alias
    .get("local")
    .and_then(Value::as_str)
    .filter(|local| !local.is_empty());
  Some(match local {
    Some(local) => format!("{} as {local}", foreign.name()),
    None => foreign.name().to_string(),
  })
}

fn strip_type_category(type_string: &str) -> &str {
  ["struct ", "contract ", "enum ", "library "]
    .iter()
    .find_map(|prefix| type_string.strip_prefix(prefix))
    .unwrap_or(type_string)
    .trim_end_matches(" storage ref")
    .trim_end_matches(" memory")
}

fn literal(node: AstNode<'_>) -> String {
  let value = node.str("value");
  let hex_value = node.str_or_empty("hexValue");
  match node.str_or_empty("kind") {
    "number" => {
      let number = value.unwrap_or_default();
      match node.str("subdenomination") {
        Some(unit) => format!("{number} {unit}"),
        None => number.to_string(),
      }
    }
    "bool" => value.unwrap_or("false").to_string(),
    "hexString" => format!("hex\"{hex_value}\""),
    "unicodeString" => format!("unicode\"{}\"", escape_string(value.unwrap_or_default())),
    _ => match value {
      Some(text) if text.is_ascii() => format!("\"{}\"", escape_string(text)),
      _ => format!("hex\"{hex_value}\""),
    },
  }
}

fn yul_literal(node: AstNode<'_>) -> String {
  match (node.str_or_empty("kind"), node.str("value")) {
    ("string", Some(value)) => format!("\"{}\"", escape_string(value)),
    ("string", None) => format!("hex\"{}\"", node.str_or_empty("hexValue")),
    (_, Some(value)) => value.to_string(),
    (_, None) => node.str_or_empty("hexValue").to_string(),
  }
}

/// Escape text for a double-quoted Solidity string literal.
pub fn escape_string(text: &str) -> String {
  let mut escaped = String::with_capacity(text.len());
  for ch in text.chars() {
    match ch {
      '\\' => escaped.push_str("\\\\"),
      '"' => escaped.push_str("\\\""),
      '\n' => escaped.push_str("\\n"),
      '\r' => escaped.push_str("\\r"),
      '\t' => escaped.push_str("\\t"),
      ch if ch.is_ascii_control() => escaped.push_str(&format!("\\x{:02x}", ch as u32)),
      ch => escaped.push(ch),
    }
  }
  escaped
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  fn render(value: Value) -> String {
    let node = AstNode::new(&value).expect("node");
    SourceWriter::new().write(node)
  }

  fn ident(name: &str) -> Value {
    json!({ "nodeType": "Identifier", "name": name })
  }

  fn elementary(name: &str) -> Value {
    json!({ "nodeType": "ElementaryTypeName", "name": name })
  }

  fn number(value: &str) -> Value {
    json!({ "nodeType": "Literal", "kind": "number", "value": value })
  }

  #[test]
  fn pragma_versions_keep_operator_spacing() {
    let caret = json!({ "nodeType": "PragmaDirective", "literals": ["solidity", "^", "0.8", ".19"] });
    assert_eq!(render(caret), "pragma solidity ^0.8.19;");

    let range = json!({
      "nodeType": "PragmaDirective",
      "literals": ["solidity", ">=", "0.6", ".0", "<", "0.9", ".0"]
    });
    assert_eq!(render(range), "pragma solidity >=0.6.0 <0.9.0;");

    let either = json!({
      "nodeType": "PragmaDirective",
      "literals": ["solidity", "^", "0.6", ".0", "||", "^", "0.7", ".0"]
    });
    assert_eq!(render(either), "pragma solidity ^0.6.0 || ^0.7.0;");

    let abicoder = json!({ "nodeType": "PragmaDirective", "literals": ["abicoder", "v2"] });
    assert_eq!(render(abicoder), "pragma abicoder v2;");
  }

  #[test]
  fn imports_render_aliases() {
    let plain = json!({ "nodeType": "ImportDirective", "file": "./A.sol", "unitAlias": "" });
    assert_eq!(render(plain), "import \"./A.sol\";");

    let symbols = json!({
      "nodeType": "ImportDirective",
      "file": "./A.sol",
      "unitAlias": "",
      "symbolAliases": [
        { "foreign": ident("A"), "local": null },
        { "foreign": ident("B"), "local": "C" }
      ]
    });
    assert_eq!(render(symbols), "import { A, B as C } from \"./A.sol\";");
  }

  #[test]
  fn function_header_collects_modifiers_and_returns() {
    let function = json!({
      "nodeType": "FunctionDefinition",
      "kind": "function",
      "name": "transfer",
      "visibility": "external",
      "stateMutability": "payable",
      "virtual": true,
      "implemented": false,
      "parameters": { "nodeType": "ParameterList", "parameters": [
        { "nodeType": "VariableDeclaration", "name": "to", "storageLocation": "default",
          "typeName": { "nodeType": "ElementaryTypeName", "name": "address", "stateMutability": "payable" } },
        { "nodeType": "VariableDeclaration", "name": "data", "storageLocation": "calldata",
          "typeName": elementary("bytes") }
      ]},
      "returnParameters": { "nodeType": "ParameterList", "parameters": [
        { "nodeType": "VariableDeclaration", "name": "", "storageLocation": "default",
          "typeName": elementary("bool") }
      ]},
      "modifiers": [
        { "nodeType": "ModifierInvocation",
          "modifierName": { "nodeType": "IdentifierPath", "name": "onlyOwner" } }
      ]
    });
    assert_eq!(
      render(function),
      "function transfer(address payable to, bytes calldata data) external payable virtual onlyOwner returns (bool);"
    );
  }

  #[test]
  fn statements_are_indented_four_spaces() {
    let function = json!({
      "nodeType": "FunctionDefinition",
      "kind": "function",
      "name": "f",
      "visibility": "public",
      "stateMutability": "nonpayable",
      "parameters": { "nodeType": "ParameterList", "parameters": [] },
      "returnParameters": { "nodeType": "ParameterList", "parameters": [] },
      "modifiers": [],
      "body": { "nodeType": "Block", "statements": [
        { "nodeType": "VariableDeclarationStatement",
          "declarations": [{ "nodeType": "VariableDeclaration", "name": "x", "storageLocation": "default",
                             "typeName": elementary("uint256") }],
          "initialValue": number("1") },
        { "nodeType": "IfStatement",
          "condition": { "nodeType": "BinaryOperation", "operator": ">",
                         "leftExpression": ident("x"), "rightExpression": number("0") },
          "trueBody": { "nodeType": "Block", "statements": [
            { "nodeType": "ExpressionStatement", "expression": {
              "nodeType": "UnaryOperation", "operator": "++", "prefix": false, "subExpression": ident("x") } }
          ]}}
      ]}
    });
    assert_eq!(
      render(function),
      "function f() public {\n    uint256 x = 1;\n    if (x > 0) {\n        x++;\n    }\n}"
    );
  }

  #[test]
  fn string_literals_are_escaped() {
    let literal = json!({ "nodeType": "Literal", "kind": "string", "value": "say \"hi\"\n" });
    assert_eq!(render(literal), "\"say \\\"hi\\\"\\n\"");

    let ether = json!({ "nodeType": "Literal", "kind": "number", "value": "1", "subdenomination": "ether" });
    assert_eq!(render(ether), "1 ether");
  }

  #[test]
  fn inline_assembly_prints_yul() {
    let assembly = json!({
      "nodeType": "InlineAssembly",
      "flags": ["memory-safe"],
      "AST": { "nodeType": "YulBlock", "statements": [
        { "nodeType": "YulVariableDeclaration",
          "variables": [{ "nodeType": "YulTypedName", "name": "size", "type": "" }],
          "value": { "nodeType": "YulFunctionCall",
                     "functionName": { "nodeType": "YulIdentifier", "name": "extcodesize" },
                     "arguments": [{ "nodeType": "YulIdentifier", "name": "a" }] } }
      ]}
    });
    assert_eq!(
      render(assembly),
      "assembly (\"memory-safe\") {\n    let size := extcodesize(a)\n}"
    );

    let legacy = json!({ "nodeType": "InlineAssembly", "operations": "{\n    stop()\n}" });
    assert_eq!(render(legacy), "assembly {\n    stop()\n}");
  }

  #[test]
  fn state_variables_render_mutability_and_initializer() {
    let variable = json!({
      "nodeType": "VariableDeclaration",
      "name": "LIMIT",
      "stateVariable": true,
      "visibility": "public",
      "mutability": "constant",
      "typeName": elementary("uint256"),
      "value": number("10")
    });
    assert_eq!(render(variable), "uint256 public constant LIMIT = 10;");

    let mapping = json!({
      "nodeType": "VariableDeclaration",
      "name": "balances",
      "stateVariable": true,
      "visibility": "internal",
      "mutability": "mutable",
      "typeName": { "nodeType": "Mapping",
                    "keyType": elementary("address"),
                    "valueType": elementary("uint256") }
    });
    assert_eq!(render(mapping), "mapping(address => uint256) internal balances;");
  }

  #[test]
  fn structured_docs_become_triple_slash_lines() {
    let writer = SourceWriter::new();
    let docs = json!({ "nodeType": "StructuredDocumentation", "text": " @notice Hi\n @dev there" });
    assert_eq!(writer.documentation(Some(&docs)), "/// @notice Hi\n/// @dev there");
    assert_eq!(writer.documentation(Some(&json!("plain"))), "plain");
    assert_eq!(writer.documentation(None), "");
  }

  fn constructor(visibility: &str) -> Value {
    json!({
      "nodeType": "FunctionDefinition",
      "kind": "constructor",
      "name": "",
      "visibility": visibility,
      "stateMutability": "nonpayable",
      "parameters": { "nodeType": "ParameterList", "parameters": [] },
      "returnParameters": { "nodeType": "ParameterList", "parameters": [] },
      "modifiers": [],
      "body": { "nodeType": "Block", "statements": [] }
    })
  }

  fn unit_with_pragma(literals: &[&str]) -> Value {
    json!({
      "nodeType": "SourceUnit",
      "nodes": [{ "nodeType": "PragmaDirective", "literals": literals }]
    })
  }

  #[test]
  fn constructor_visibility_follows_the_pragma() {
    let ctor = constructor("public");
    let ctor = AstNode::new(&ctor).expect("constructor");

    let legacy = unit_with_pragma(&["solidity", ">=", "0.6", ".0", "<", "0.9", ".0"]);
    let writer = SourceWriter::for_source_unit(AstNode::new(&legacy).expect("unit"));
    assert_eq!(writer.write(ctor), "constructor() public {}");

    let old = unit_with_pragma(&["solidity", "^", "0.4", ".24"]);
    let writer = SourceWriter::for_source_unit(AstNode::new(&old).expect("unit"));
    assert_eq!(writer.write(ctor), "constructor() public {}");

    let current = unit_with_pragma(&["solidity", "^", "0.8", ".19"]);
    let writer = SourceWriter::for_source_unit(AstNode::new(&current).expect("unit"));
    assert_eq!(writer.write(ctor), "constructor() {}");

    let unpinned = unit_with_pragma(&["abicoder", "v2"]);
    let writer = SourceWriter::for_source_unit(AstNode::new(&unpinned).expect("unit"));
    assert_eq!(writer.write(ctor), "constructor() {}");
  }

  #[test]
  fn free_functions_never_print_visibility() {
    let legacy = unit_with_pragma(&["solidity", "^", "0.6", ".12"]);
    let writer = SourceWriter::for_source_unit(AstNode::new(&legacy).expect("unit"));
    let function = json!({
      "nodeType": "FunctionDefinition",
      "kind": "freeFunction",
      "name": "one",
      "visibility": "internal",
      "stateMutability": "pure",
      "parameters": { "nodeType": "ParameterList", "parameters": [] },
      "returnParameters": { "nodeType": "ParameterList", "parameters": [] },
      "body": { "nodeType": "Block", "statements": [] }
    });
    assert_eq!(
      writer.write(AstNode::new(&function).expect("function")),
      "function one() pure {}"
    );
  }
}
