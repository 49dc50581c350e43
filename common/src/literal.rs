//! JavaScript 字面量解析器
//!
//! 从远端页面的脚本中提取数组/对象字面量（如 `sources: [{file: "..."}]`），
//! 只做语法解析，不执行任何代码。
//!
//! 支持：
//! - 数组、对象（键可以不加引号）、尾随逗号
//! - 单引号、双引号、反引号字符串及常见转义
//! - 数字、`true` / `false` / `null` / `undefined`
//! - `//` 与 `/* */` 注释

use serde_json::{Map, Number, Value};

use crate::error::{ResolveError, ResolveResult};

/// 最大嵌套深度
const MAX_DEPTH: usize = 64;

/// 字面量解析器
pub struct LiteralParser {
    chars: Vec<char>,
    pos: usize,
    depth: usize,
}

impl LiteralParser {
    pub fn new(input: &str) -> Self {
        Self {
            chars: input.chars().collect(),
            pos: 0,
            depth: 0,
        }
    }

    /// 解析开头的一个字面量，忽略其后的内容
    pub fn parse(&mut self) -> ResolveResult<Value> {
        self.skip_trivia();
        self.parse_value()
    }

    /// 已消费的字符数
    pub fn position(&self) -> usize {
        self.pos
    }

    // ========== 字符访问方法 ==========

    fn current_char(&self) -> char {
        self.chars.get(self.pos).copied().unwrap_or('\0')
    }

    fn peek_char(&self) -> char {
        self.chars.get(self.pos + 1).copied().unwrap_or('\0')
    }

    fn at_end(&self) -> bool {
        self.pos >= self.chars.len()
    }

    fn error(&self, message: &str) -> ResolveError {
        ResolveError::Parse(format!("字面量解析失败（位置 {}）: {}", self.pos, message))
    }

    fn expect(&mut self, c: char) -> ResolveResult<()> {
        if self.current_char() == c {
            self.pos += 1;
            Ok(())
        } else {
            Err(self.error(&format!("期望 '{}'", c)))
        }
    }

    /// 跳过空白和注释
    fn skip_trivia(&mut self) {
        loop {
            while !self.at_end() && self.current_char().is_whitespace() {
                self.pos += 1;
            }

            match (self.current_char(), self.peek_char()) {
                ('/', '/') => {
                    while !self.at_end() && self.current_char() != '\n' {
                        self.pos += 1;
                    }
                }
                ('/', '*') => {
                    self.pos += 2;
                    while !self.at_end() && !(self.current_char() == '*' && self.peek_char() == '/') {
                        self.pos += 1;
                    }
                    self.pos = (self.pos + 2).min(self.chars.len());
                }
                _ => return,
            }
        }
    }

    // ========== 值解析方法 ==========

    fn parse_value(&mut self) -> ResolveResult<Value> {
        if self.at_end() {
            return Err(self.error("意外的结尾"));
        }

        match self.current_char() {
            '[' => self.nested(Self::parse_array),
            '{' => self.nested(Self::parse_object),
            '"' | '\'' | '`' => self.parse_string().map(Value::String),
            c if c == '-' || c == '+' || c == '.' || c.is_ascii_digit() => self.parse_number(),
            c if is_ident_start(c) => self.parse_keyword(),
            c => Err(self.error(&format!("无法识别的字符 '{}'", c))),
        }
    }

    fn nested(&mut self, parse: fn(&mut Self) -> ResolveResult<Value>) -> ResolveResult<Value> {
        if self.depth >= MAX_DEPTH {
            return Err(self.error("嵌套过深"));
        }
        self.depth += 1;
        let result = parse(self);
        self.depth -= 1;
        result
    }

    fn parse_array(&mut self) -> ResolveResult<Value> {
        self.expect('[')?;
        let mut items = Vec::new();

        loop {
            self.skip_trivia();
            match self.current_char() {
                ']' => {
                    self.pos += 1;
                    return Ok(Value::Array(items));
                }
                ',' => {
                    // 稀疏数组中的空位
                    self.pos += 1;
                    continue;
                }
                _ => {}
            }

            items.push(self.parse_value()?);
            self.skip_trivia();

            match self.current_char() {
                ',' => self.pos += 1,
                ']' => {}
                _ => return Err(self.error("数组元素之间缺少逗号")),
            }
        }
    }

    fn parse_object(&mut self) -> ResolveResult<Value> {
        self.expect('{')?;
        let mut map = Map::new();

        loop {
            self.skip_trivia();
            if self.current_char() == '}' {
                self.pos += 1;
                return Ok(Value::Object(map));
            }

            let key = self.parse_key()?;
            self.skip_trivia();
            self.expect(':')?;
            self.skip_trivia();
            let value = self.parse_value()?;
            map.insert(key, value);
            self.skip_trivia();

            match self.current_char() {
                ',' => self.pos += 1,
                '}' => {}
                _ => return Err(self.error("对象成员之间缺少逗号")),
            }
        }
    }

    fn parse_key(&mut self) -> ResolveResult<String> {
        match self.current_char() {
            '"' | '\'' | '`' => self.parse_string(),
            c if is_ident_start(c) || c.is_ascii_digit() => {
                let start = self.pos;
                while !self.at_end() && is_ident_part(self.current_char()) {
                    self.pos += 1;
                }
                Ok(self.chars[start..self.pos].iter().collect())
            }
            _ => Err(self.error("无效的对象键")),
        }
    }

    fn parse_string(&mut self) -> ResolveResult<String> {
        let quote = self.current_char();
        self.pos += 1;
        let mut result = String::new();

        while !self.at_end() {
            let c = self.current_char();
            self.pos += 1;

            if c == quote {
                return Ok(result);
            }
            if quote == '`' && c == '$' && self.current_char() == '{' {
                return Err(self.error("不支持模板字符串插值"));
            }
            if c != '\\' {
                result.push(c);
                continue;
            }

            let escaped = self.current_char();
            self.pos += 1;
            match escaped {
                'n' => result.push('\n'),
                't' => result.push('\t'),
                'r' => result.push('\r'),
                'b' => result.push('\u{8}'),
                'f' => result.push('\u{c}'),
                '0' => result.push('\0'),
                'u' => result.push(self.parse_hex_escape(4)?),
                'x' => result.push(self.parse_hex_escape(2)?),
                '\n' => {}
                other => result.push(other),
            }
        }

        Err(self.error("字符串未结束"))
    }

    fn parse_hex_escape(&mut self, len: usize) -> ResolveResult<char> {
        let end = self.pos + len;
        if end > self.chars.len() {
            return Err(self.error("转义序列不完整"));
        }
        let hex: String = self.chars[self.pos..end].iter().collect();
        self.pos = end;

        u32::from_str_radix(&hex, 16)
            .ok()
            .and_then(char::from_u32)
            .ok_or_else(|| self.error("无效的转义序列"))
    }

    fn parse_number(&mut self) -> ResolveResult<Value> {
        let start = self.pos;
        if matches!(self.current_char(), '-' | '+') {
            self.pos += 1;
        }
        while !self.at_end()
            && (self.current_char().is_ascii_alphanumeric() || self.current_char() == '.')
        {
            // 指数部分的符号
            if matches!(self.current_char(), 'e' | 'E') && matches!(self.peek_char(), '-' | '+') {
                self.pos += 1;
            }
            self.pos += 1;
        }

        let text: String = self.chars[start..self.pos].iter().collect();
        let text = text.trim_start_matches('+');

        if let Ok(int) = text.parse::<i64>() {
            return Ok(Value::from(int));
        }
        text.parse::<f64>()
            .ok()
            .and_then(Number::from_f64)
            .map(Value::Number)
            .ok_or_else(|| self.error(&format!("无效的数字 '{}'", text)))
    }

    fn parse_keyword(&mut self) -> ResolveResult<Value> {
        let start = self.pos;
        while !self.at_end() && is_ident_part(self.current_char()) {
            self.pos += 1;
        }
        let word: String = self.chars[start..self.pos].iter().collect();

        match word.as_str() {
            "true" => Ok(Value::Bool(true)),
            "false" => Ok(Value::Bool(false)),
            "null" | "undefined" => Ok(Value::Null),
            _ => Err(self.error(&format!("不支持的标识符 '{}'", word))),
        }
    }
}

fn is_ident_start(c: char) -> bool {
    c.is_alphabetic() || c == '_' || c == '$'
}

fn is_ident_part(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || c == '$'
}

/// 在脚本中查找 `marker` 之后的第一个数组/对象字面量
///
/// 依次尝试每一处出现的 `marker`，返回第一个能成功解析的结果。
pub fn find_literal(source: &str, marker: &str) -> Option<Value> {
    let mut search_from = 0;

    while let Some(offset) = source[search_from..].find(marker) {
        let after = search_from + offset + marker.len();
        search_from = after;

        let rest = source[after..].trim_start_matches(|c: char| c.is_whitespace() || c == '=' || c == ':');
        if !rest.starts_with(['[', '{']) {
            continue;
        }

        match LiteralParser::new(rest).parse() {
            Ok(value) => return Some(value),
            Err(e) => log::debug!("Literal after {:?} rejected: {}", marker, e),
        }
    }

    None
}
