use super::*;

impl Parser {
    /// TYPE :: (name TYPE_INPUTS | ? | # UNIT? | text LANGUAGE? | ! NAMES? | LIST_TYPE
    ///          | SET_OR_MAP_TYPE | TABLE_TYPE | FUNCTION_TYPE | ∆ TYPE | _) (∨ TYPE)*
    pub(crate) fn parse_type(&mut self) -> NodeId {
        use TokenKind as TK;

        let mut left = match self.cursor.peek().kind {
            TK::Name => {
                let name = self.cursor.read();
                let type_inputs = self.parse_type_inputs();
                self.alloc(NameType { dot: None, name, type_inputs })
            },
            TK::Conditional => {
                let token = self.cursor.read();
                self.alloc(BooleanType { token })
            },
            TK::MeasurementType => {
                let hash = self.cursor.read();
                let unit = if self.cursor.next_is(TK::Name) && self.cursor.next_lacks_preceding_space() {
                    Some(self.parse_unit())
                } else {
                    None
                };
                self.alloc(MeasurementType { hash, unit })
            },
            TK::Text => {
                let quote = self.cursor.read();
                let format = if self.cursor.next_is(TK::Language) { Some(self.parse_language()) } else { None };
                self.alloc(TextType { quote, format })
            },
            TK::None => {
                let none = self.cursor.read();
                let names = self.parse_names();
                self.alloc(NoneType { none, names })
            },
            TK::ListOpen => self.parse_list_type(),
            TK::SetOpen => self.parse_set_or_map_type(),
            TK::Table => {
                let mut columns = Vec::new();
                while self.cursor.next_is(TK::Table) {
                    let bar = self.cursor.read();
                    let bind = self.parse_bind(false);
                    columns.push(self.alloc(Column { bar, bind }));
                }
                self.alloc(TableType { columns })
            },
            TK::Function => self.parse_function_type(),
            TK::Stream => {
                let delta = self.cursor.read();
                let ty = self.parse_type();
                self.alloc(StreamType { delta, ty })
            },
            TK::Placeholder => {
                let token = self.cursor.read();
                self.alloc(TypePlaceholder { token })
            },
            _ => self.unparsable(UnparsableReason::ExpectedType, Vec::new()),
        };

        while !self.is_unparsable(left) && self.cursor.next_is_text(TK::BinaryOp, SYM_UNION) {
            let or = self.cursor.read();
            let right = self.parse_type();
            left = self.alloc(UnionType { left, or, right });
        }

        left
    }

    /// TYPE_INPUTS :: (∘ TYPE)*
    pub(crate) fn parse_type_inputs(&mut self) -> Vec<NodeId> {
        let mut inputs = Vec::new();
        while self.cursor.next_is(TokenKind::TypeVariable) {
            let open = self.cursor.read();
            let ty = self.parse_type();
            inputs.push(self.alloc(TypeInput { open, ty }));
        }
        inputs
    }

    /// LIST_TYPE :: [ TYPE? ]
    fn parse_list_type(&mut self) -> NodeId {
        let open = self.cursor.read();
        let item = if self.cursor.next_is_not(TokenKind::ListClose) { Some(self.parse_type()) } else { None };
        if !self.cursor.next_is(TokenKind::ListClose) {
            let mut before = vec![tok(open)];
            before.extend(item.into_iter().map(node));
            return self.unparsable(UnparsableReason::ExpectedListClose, before);
        }
        let close = self.cursor.read();
        self.alloc(ListType { open, item, close })
    }

    /// SET_OR_MAP_TYPE :: { TYPE? } | { TYPE : TYPE }
    fn parse_set_or_map_type(&mut self) -> NodeId {
        let open = self.cursor.read();
        let mut key = None;
        let mut bind = None;
        let mut value = None;
        if self.cursor.next_is_not(TokenKind::SetClose) {
            key = Some(self.parse_type());
            if self.cursor.next_is(TokenKind::Bind) {
                bind = Some(self.cursor.read());
                value = Some(self.parse_type());
            }
        }
        if !self.cursor.next_is(TokenKind::SetClose) {
            let mut before = vec![tok(open)];
            before.extend(key.into_iter().map(node));
            before.extend(bind.into_iter().map(tok));
            before.extend(value.into_iter().map(node));
            return self.unparsable(UnparsableReason::ExpectedSetClose, before);
        }
        let close = self.cursor.read();
        self.alloc(SetOrMapType { open, key, bind, value, close })
    }

    /// FUNCTION_TYPE :: ƒ ( TYPE* ) TYPE
    fn parse_function_type(&mut self) -> NodeId {
        let fun = self.cursor.read();
        if !self.cursor.next_is(TokenKind::EvalOpen) {
            return self.unparsable(UnparsableReason::ExpectedEvalOpen, vec![tok(fun)]);
        }
        let open = self.cursor.read();
        let mut inputs = Vec::new();
        while self.cursor.next_is_not(TokenKind::EvalClose) {
            inputs.push(self.parse_type());
        }
        if !self.cursor.next_is(TokenKind::EvalClose) {
            let mut before = vec![tok(fun), tok(open)];
            before.extend(inputs.into_iter().map(node));
            return self.unparsable(UnparsableReason::ExpectedEvalClose, before);
        }
        let close = self.cursor.read();
        let output = self.parse_type();
        self.alloc(FunctionType { fun, open, inputs, close, output })
    }
}
