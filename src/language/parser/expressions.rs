use super::*;

impl Parser {
    /// EXPRESSION :: BINARY (? EXPRESSION EXPRESSION)?
    pub(crate) fn parse_expression(&mut self) -> NodeId {
        let left = self.parse_binary_operation();
        if !self.is_unparsable(left) && self.cursor.next_is(TokenKind::Conditional) {
            let question = self.cursor.read();
            let yes = self.parse_expression();
            let no = self.parse_expression();
            return self.alloc(Conditional { condition: left, question, yes, no });
        }
        left
    }

    /// BINARY :: ATOMIC ((binary_op ATOMIC) | (• TYPE))*
    ///
    /// Operators are applied strictly left to right. A `•` starting a line
    /// begins a structure definition instead.
    fn parse_binary_operation(&mut self) -> NodeId {
        let mut left = self.parse_atomic_expression();
        while !self.is_unparsable(left) {
            if self.cursor.next_is(TokenKind::Type) && !self.cursor.next_has_preceding_line_break() {
                let dot = self.cursor.read();
                let ty = self.parse_type();
                left = self.alloc(Is { expression: left, dot, ty });
            } else if self.cursor.next_is(TokenKind::BinaryOp) {
                let operator = self.cursor.read();
                let right = self.parse_atomic_expression();
                left = self.alloc(BinaryOperation { left, operator, right });
            } else {
                break;
            }
        }
        left
    }

    fn parse_atomic_expression(&mut self) -> NodeId {
        use TokenKind as TK;

        let next = self.cursor.peek().kind;
        let mut left = match next {
            TK::None => {
                let none = self.cursor.read();
                let names = self.parse_names();
                self.alloc(NoneLiteral { none, names })
            },
            TK::Name => {
                let name = self.cursor.read();
                self.alloc(Reference { name })
            },
            TK::Boolean => {
                let value = self.cursor.read();
                self.alloc(BooleanLiteral { value })
            },
            TK::Number => self.parse_measurement(),
            TK::Text => {
                let text = self.cursor.read();
                let format = self.parse_format();
                self.alloc(TextLiteral { text, format })
            },
            TK::TemplateOpen => self.parse_template(),
            TK::ListOpen => self.parse_list(),
            TK::SetOpen => self.parse_set_or_map(),
            TK::Table => self.parse_table(),
            TK::Access => {
                let dot = self.cursor.read();
                self.alloc(This { dot })
            },
            TK::Placeholder => {
                let token = self.cursor.read();
                self.alloc(ExpressionPlaceholder { token })
            },
            TK::UnaryOp => self.parse_unary(),
            TK::BinaryOp if self.cursor.next_is_text(TK::BinaryOp, SYM_NEGATE) => self.parse_unary(),
            _ => {
                if self.cursor.next_are_docs_then(TK::EvalOpen) {
                    self.parse_block(false)
                } else if self.cursor.next_are_docs_then(TK::Type) {
                    self.parse_structure()
                } else if self.cursor.next_are_docs_then(TK::Function) {
                    self.parse_function()
                } else if self.cursor.next_are_docs_then(TK::Convert) {
                    self.parse_conversion()
                } else {
                    self.unparsable(UnparsableReason::ExpectedExpression, Vec::new())
                }
            }
        };

        // Postfix operators bind to the expression before them, in order
        while !self.is_unparsable(left) {
            left = if self.cursor.next_is(TK::Access) {
                self.parse_access(left)
            } else if self.cursor.next_is(TK::ListOpen) && self.cursor.next_lacks_preceding_space() {
                self.parse_list_access(left)
            } else if self.cursor.next_is(TK::SetOpen) && self.cursor.next_lacks_preceding_space() {
                self.parse_set_or_map_access(left)
            } else if self.cursor.next_is_one_of(&[TK::EvalOpen, TK::TypeVariable]) && self.cursor.next_lacks_preceding_space() {
                self.parse_evaluate(left)
            } else if self.cursor.next_is(TK::Convert) && !self.cursor.next_has_preceding_line_break() {
                let convert = self.cursor.read();
                let ty = self.parse_type();
                self.alloc(Convert { expression: left, convert, ty })
            } else if self.cursor.next_is(TK::Select) {
                let select = self.cursor.read();
                let row = self.parse_row();
                let query = self.parse_expression();
                self.alloc(Select { table: left, select, row, query })
            } else if self.cursor.next_is(TK::Insert) {
                let insert = self.cursor.read();
                let row = self.parse_row();
                self.alloc(Insert { table: left, insert, row })
            } else if self.cursor.next_is(TK::Update) {
                let update = self.cursor.read();
                let row = self.parse_row();
                let query = self.parse_expression();
                self.alloc(Update { table: left, update, row, query })
            } else if self.cursor.next_is(TK::Delete) {
                let delete = self.cursor.read();
                let query = self.parse_expression();
                self.alloc(Delete { table: left, delete, query })
            } else if self.cursor.next_is(TK::Stream) {
                let delta = self.cursor.read();
                let stream = self.parse_expression();
                let next = self.parse_expression();
                self.alloc(Reaction { initial: left, delta, stream, next })
            } else {
                break;
            };
        }

        left
    }

    fn parse_unary(&mut self) -> NodeId {
        let operator = self.cursor.read();
        let operand = self.parse_atomic_expression();
        self.alloc(UnaryOperation { operator, operand })
    }

    /// Optional `/format` after a text.
    fn parse_format(&mut self) -> Option<NodeId> {
        if self.cursor.next_is(TokenKind::Language) {
            Some(self.parse_language())
        } else {
            None
        }
    }

    /// MEASUREMENT :: number UNIT?
    fn parse_measurement(&mut self) -> NodeId {
        let number = self.cursor.read();
        let unit = if self.cursor.next_is(TokenKind::Name) && self.cursor.next_lacks_preceding_space() {
            Some(self.parse_unit())
        } else {
            None
        };
        self.alloc(MeasurementLiteral { number, unit })
    }

    /// UNIT :: name (^number)? (· name (^number)?)* (/ name (^number)? (· name (^number)?)*)?
    pub(crate) fn parse_unit(&mut self) -> NodeId {
        let mut tokens = vec![self.cursor.read()];
        self.parse_unit_exponent(&mut tokens);
        if let Err(unparsable) = self.parse_unit_products(&mut tokens) {
            return unparsable;
        }
        if self.cursor.next_is(TokenKind::Language) && self.cursor.next_lacks_preceding_space() {
            tokens.push(self.cursor.read());
            if !self.cursor.next_is(TokenKind::Name) {
                let before = tokens.into_iter().map(tok).collect();
                return self.unparsable(UnparsableReason::ExpectedUnitName, before);
            }
            tokens.push(self.cursor.read());
            self.parse_unit_exponent(&mut tokens);
            if let Err(unparsable) = self.parse_unit_products(&mut tokens) {
                return unparsable;
            }
        }
        self.alloc(Unit { tokens })
    }

    fn parse_unit_products(&mut self, tokens: &mut Vec<TokenId>) -> Result<(), NodeId> {
        while self.cursor.next_is_text(TokenKind::BinaryOp, SYM_PRODUCT) && self.cursor.next_lacks_preceding_space() {
            tokens.push(self.cursor.read());
            if !self.cursor.next_is(TokenKind::Name) {
                let before = tokens.iter().copied().map(tok).collect();
                return Err(self.unparsable(UnparsableReason::ExpectedUnitName, before));
            }
            tokens.push(self.cursor.read());
            self.parse_unit_exponent(tokens);
        }
        Ok(())
    }

    fn parse_unit_exponent(&mut self, tokens: &mut Vec<TokenId>) {
        if self.cursor.next_is_text(TokenKind::BinaryOp, SYM_POWER)
            && self.cursor.next_lacks_preceding_space()
            && self.cursor.peek_at(1).is(TokenKind::Number)
            && !self.cursor.peek_at(1).preceding_space
        {
            tokens.push(self.cursor.read());
            tokens.push(self.cursor.read());
        }
    }

    /// TEMPLATE :: text_open (EXPRESSION text_between)* EXPRESSION text_close LANGUAGE?
    fn parse_template(&mut self) -> NodeId {
        let mut parts = vec![tok(self.cursor.read())];
        loop {
            let expression = self.parse_expression();
            parts.push(node(expression));
            if self.is_unparsable(expression) {
                return self.unparsable(UnparsableReason::ExpectedTextClose, parts);
            }
            if self.cursor.next_is(TokenKind::TemplateBetween) {
                parts.push(tok(self.cursor.read()));
            } else if self.cursor.next_is(TokenKind::TemplateClose) {
                parts.push(tok(self.cursor.read()));
                break;
            } else {
                return self.unparsable(UnparsableReason::ExpectedTextClose, parts);
            }
        }
        let format = self.parse_format();
        self.alloc(Template { parts, format })
    }

    /// LIST :: [ EXPRESSION* ]
    fn parse_list(&mut self) -> NodeId {
        let open = self.cursor.read();
        let mut values = Vec::new();
        while self.cursor.next_is_not(TokenKind::ListClose) {
            values.push(self.parse_expression());
        }
        if !self.cursor.next_is(TokenKind::ListClose) {
            let mut before = vec![tok(open)];
            before.extend(values.into_iter().map(node));
            return self.unparsable(UnparsableReason::ExpectedListClose, before);
        }
        let close = self.cursor.read();
        self.alloc(ListLiteral { open, values, close })
    }

    /// SET :: { EXPRESSION* }
    /// MAP :: { (EXPRESSION : EXPRESSION)* } | {:}
    fn parse_set_or_map(&mut self) -> NodeId {
        let open = self.cursor.read();

        if self.cursor.next_is_sequence(&[TokenKind::Bind, TokenKind::SetClose]) {
            let bind = Some(self.cursor.read());
            let close = self.cursor.read();
            return self.alloc(MapLiteral { open, pairs: Vec::new(), bind, close });
        }

        let mut values = Vec::new();
        let mut is_map = false;
        while self.cursor.next_is_not(TokenKind::SetClose) {
            let key = self.parse_expression();
            if self.cursor.next_is(TokenKind::Bind) {
                let bind = self.cursor.read();
                let value = self.parse_expression();
                values.push(self.alloc(KeyValue { key, bind, value }));
                is_map = true;
            } else {
                values.push(key);
            }
        }

        if !self.cursor.next_is(TokenKind::SetClose) {
            let mut before = vec![tok(open)];
            before.extend(values.into_iter().map(node));
            return self.unparsable(UnparsableReason::ExpectedSetClose, before);
        }
        let close = self.cursor.read();

        if is_map {
            self.alloc(MapLiteral { open, pairs: values, bind: None, close })
        } else {
            self.alloc(SetLiteral { open, values, close })
        }
    }

    /// TABLE :: (| BIND)+ ROW*
    fn parse_table(&mut self) -> NodeId {
        let mut columns = Vec::new();
        while self.cursor.next_is(TokenKind::Table) {
            let bar = self.cursor.read();
            let bind = self.parse_bind(true);
            columns.push(self.alloc(Column { bar, bind }));
            if self.cursor.next_has_preceding_line_break() {
                break;
            }
        }

        let mut rows = Vec::new();
        while self.cursor.next_is(TokenKind::Table) {
            rows.push(self.parse_row());
        }

        self.alloc(TableLiteral { columns, rows })
    }

    /// ROW :: (| (BIND|EXPRESSION))*
    fn parse_row(&mut self) -> NodeId {
        let mut cells = Vec::new();
        while self.cursor.next_is(TokenKind::Table) {
            let bar = self.cursor.read();
            let value = if self.next_is_bind() { self.parse_bind(true) } else { self.parse_expression() };
            cells.push(self.alloc(Cell { bar, value }));
            if self.cursor.next_has_preceding_line_break() {
                break;
            }
        }
        self.alloc(Row { cells })
    }

    /// ACCESS :: EXPRESSION . name
    fn parse_access(&mut self, structure: NodeId) -> NodeId {
        let dot = self.cursor.read();
        if !self.cursor.next_is(TokenKind::Name) {
            return self.unparsable(UnparsableReason::ExpectedAccessName, vec![node(structure), tok(dot)]);
        }
        let name = self.cursor.read();
        self.alloc(PropertyReference { structure, dot, name })
    }

    /// LIST_ACCESS :: EXPRESSION[EXPRESSION]
    fn parse_list_access(&mut self, list: NodeId) -> NodeId {
        let open = self.cursor.read();
        let index = self.parse_expression();
        if !self.cursor.next_is(TokenKind::ListClose) {
            let before = vec![node(list), tok(open), node(index)];
            return self.unparsable(UnparsableReason::ExpectedListClose, before);
        }
        let close = self.cursor.read();
        self.alloc(ListAccess { list, open, index, close })
    }

    /// SET_ACCESS :: EXPRESSION{EXPRESSION}
    fn parse_set_or_map_access(&mut self, set: NodeId) -> NodeId {
        let open = self.cursor.read();
        let key = self.parse_expression();
        if !self.cursor.next_is(TokenKind::SetClose) {
            let before = vec![node(set), tok(open), node(key)];
            return self.unparsable(UnparsableReason::ExpectedSetClose, before);
        }
        let close = self.cursor.read();
        self.alloc(SetOrMapAccess { set, open, key, close })
    }

    /// EVALUATE :: EXPRESSION TYPE_INPUTS? ( (BIND|EXPRESSION)* )
    fn parse_evaluate(&mut self, func: NodeId) -> NodeId {
        let type_inputs = self.parse_type_inputs();
        let mut before = vec![node(func)];
        before.extend(type_inputs.iter().copied().map(node));

        if !self.cursor.next_is(TokenKind::EvalOpen) {
            return self.unparsable(UnparsableReason::ExpectedEvalOpen, before);
        }
        let open = self.cursor.read();

        let mut inputs = Vec::new();
        while self.cursor.next_is_not(TokenKind::EvalClose) {
            let input = if self.next_is_bind() { self.parse_bind(true) } else { self.parse_expression() };
            inputs.push(input);
        }

        if !self.cursor.next_is(TokenKind::EvalClose) {
            before.push(tok(open));
            before.extend(inputs.into_iter().map(node));
            return self.unparsable(UnparsableReason::ExpectedEvalClose, before);
        }
        let close = self.cursor.read();
        self.alloc(Evaluate { func, type_inputs, open, inputs, close })
    }

    /// TYPE_VARIABLES :: (∘ NAMES)*
    pub(crate) fn parse_type_variables(&mut self) -> Vec<NodeId> {
        let mut variables = Vec::new();
        while self.cursor.next_is(TokenKind::TypeVariable) {
            let open = self.cursor.read();
            match self.parse_names() {
                Some(names) => variables.push(self.alloc(TypeVariable { open, names })),
                None => {
                    let unparsable = self.unparsable(UnparsableReason::ExpectedTypeVariableName, vec![tok(open)]);
                    variables.push(unparsable);
                    break;
                }
            }
        }
        variables
    }

    /// FUNCTION :: DOCS? ƒ NAMES? TYPE_VARIABLES ( BIND* ) (• TYPE)? (EXPRESSION | …)
    fn parse_function(&mut self) -> NodeId {
        let docs = self.parse_docs();
        let fun = self.cursor.read();
        let names = self.parse_names();
        let type_variables = self.parse_type_variables();

        let mut before: Vec<Child> = docs.into_iter().map(node).collect();
        before.push(tok(fun));
        before.extend(names.into_iter().map(node));
        before.extend(type_variables.iter().copied().map(node));

        if !self.cursor.next_is(TokenKind::EvalOpen) {
            return self.unparsable(UnparsableReason::ExpectedEvalOpen, before);
        }
        let open = self.cursor.read();

        let mut inputs = Vec::new();
        while self.cursor.next_is_not(TokenKind::EvalClose) {
            inputs.push(self.parse_bind(true));
        }
        if !self.cursor.next_is(TokenKind::EvalClose) {
            before.push(tok(open));
            before.extend(inputs.into_iter().map(node));
            return self.unparsable(UnparsableReason::ExpectedEvalClose, before);
        }
        let close = self.cursor.read();

        let mut dot = None;
        let mut output = None;
        if self.cursor.next_is(TokenKind::Type) {
            dot = Some(self.cursor.read());
            output = Some(self.parse_type());
        }

        let (etc, body) = if self.cursor.next_is(TokenKind::Etc) {
            (Some(self.cursor.read()), None)
        } else {
            (None, Some(self.parse_expression()))
        };

        self.alloc(FunctionDefinition {
            docs, fun, names, type_variables, open, inputs, close, dot, output, etc, body,
        })
    }

    /// STRUCTURE :: DOCS? • NAMES (• name)* TYPE_VARIABLES ( BIND* ) BLOCK?
    fn parse_structure(&mut self) -> NodeId {
        let docs = self.parse_docs();
        let dot = self.cursor.read();
        let mut before: Vec<Child> = docs.into_iter().map(node).collect();
        before.push(tok(dot));

        let names = match self.parse_names() {
            Some(names) => names,
            None => return self.unparsable(UnparsableReason::ExpectedStructureName, before),
        };
        before.push(node(names));

        let mut interfaces = Vec::new();
        while self.cursor.next_is(TokenKind::Type) {
            let interface_dot = self.cursor.read();
            if !self.cursor.next_is(TokenKind::Name) {
                before.extend(interfaces.into_iter().map(node));
                before.push(tok(interface_dot));
                return self.unparsable(UnparsableReason::ExpectedStructureName, before);
            }
            let name = self.cursor.read();
            interfaces.push(self.alloc(NameType { dot: Some(interface_dot), name, type_inputs: Vec::new() }));
        }
        before.extend(interfaces.iter().copied().map(node));

        let type_variables = self.parse_type_variables();
        before.extend(type_variables.iter().copied().map(node));

        if !self.cursor.next_is(TokenKind::EvalOpen) {
            return self.unparsable(UnparsableReason::ExpectedEvalOpen, before);
        }
        let open = self.cursor.read();

        let mut inputs = Vec::new();
        while self.cursor.next_is_not(TokenKind::EvalClose) {
            inputs.push(self.parse_bind(true));
        }
        if !self.cursor.next_is(TokenKind::EvalClose) {
            before.push(tok(open));
            before.extend(inputs.into_iter().map(node));
            return self.unparsable(UnparsableReason::ExpectedEvalClose, before);
        }
        let close = self.cursor.read();

        let block = if self.cursor.next_is_one_of(&[TokenKind::Docs, TokenKind::EvalOpen]) {
            Some(self.parse_block(false))
        } else {
            None
        };

        self.alloc(StructureDefinition {
            docs, dot, names, interfaces, type_variables, open, inputs, close, block,
        })
    }

    /// CONVERSION :: DOCS? → TYPE TYPE EXPRESSION
    fn parse_conversion(&mut self) -> NodeId {
        let docs = self.parse_docs();
        let convert = self.cursor.read();
        let input = self.parse_type();
        let output = self.parse_type();
        let expression = self.parse_expression();
        self.alloc(ConversionDefinition { docs, convert, input, output, expression })
    }
}
