// SPDX-License-Identifier: Apache-2.0

//! Builds [`FileTree`]s from `.te`/`.if`/`.fc` source text.
//!
//! This is a small set of line/token-oriented combinators, not a full
//! M4-aware macro processor: it accepts already-M4-expanded `.te`/`.if`
//! text, or text with no M4 macros beyond interface and template calls.
//! Those calls look like ordinary parenthesized function calls, and in
//! valid refpolicy source their parens are always balanced, so a plain
//! paren-depth count finds their extent without any backtick/quote
//! tracking. Line numbers attached to nodes nested inside a block
//! construct (an interface body, a `require` block, a conditional) are
//! relative to that block's own start rather than the file's absolute
//! line, since each block is parsed as an independent sub-document.

use crate::ast::{
    AliasData, AttributeStmtData, AvRuleData, AvRuleFlavor, CondDeclData, DeclData, DeclFlavor,
    FcContext, FcEntryData, FileTree, GenReqData, HeaderData, IfCallData, InterfaceDefData,
    NodeFlavor, NodeId, Payload, PermissiveData, RoleAllowData, RoleTypesData, RtRuleData,
    TransitionKind, TtRuleData, XavRuleData,
};
use crate::string_list::{NameFlavor, NameList, StringItem, StringList};
use nom::branch::alt;
use nom::bytes::complete::{is_not, tag, take_till1};
use nom::character::complete::{char, multispace1, one_of};
use nom::combinator::{map, map_opt, opt, rest};
use nom::sequence::{delimited, preceded, terminated};
use nom::IResult;
use selint_error::{Error, ErrorKind, Result};

pub fn parse_te_file(filename: &str, source: &str) -> Result<FileTree> {
    let mut tree = FileTree::new(filename, NodeFlavor::TeFile);
    let root = tree.root;
    parse_block(&mut tree, root, source, 1);
    Ok(tree)
}

pub fn parse_if_file(filename: &str, source: &str) -> Result<FileTree> {
    let mut tree = FileTree::new(filename, NodeFlavor::IfFile);
    let root = tree.root;
    parse_block(&mut tree, root, source, 1);
    Ok(tree)
}

pub fn parse_fc_file(filename: &str, source: &str) -> Result<FileTree> {
    let mut tree = FileTree::new(filename, NodeFlavor::FcFile);
    let root = tree.root;
    let mut prev: Option<NodeId> = None;

    for (i, raw_line) in source.lines().enumerate() {
        let lineno = (i + 1) as u32;
        let (code, comment) = split_comment(raw_line);

        if code.trim().is_empty() {
            if let Some(text) = comment {
                prev = Some(append(&mut tree, prev, root, NodeFlavor::Comment, Payload::Comment(text.to_string()), lineno));
            }
            continue;
        }

        let id = match parse_fc_entry_line(code.trim()) {
            Some(data) => append(&mut tree, prev, root, NodeFlavor::FcEntry, Payload::FcEntry(data), lineno),
            None => {
                log::debug!("{filename}:{lineno}: unrecognized file context entry: {}", code.trim());
                append(&mut tree, prev, root, NodeFlavor::Error, Payload::ErrorText(code.trim().to_string()), lineno)
            }
        };
        attach_disable_comment(&mut tree, id, comment);
        prev = Some(id);
    }

    Ok(tree)
}

/// An `access_vectors` source declares object classes and the
/// permissions each one carries, e.g.:
/// ```text
/// common file
/// {
///     ioctl
///     read
/// }
///
/// class dir
/// inherits file
/// {
///     add_name
///     remove_name
/// }
/// ```
/// `common` and `class` both become a `Class`-flavored [`Decl`](Payload::Decl),
/// and each permission token inside the brace block becomes its own
/// `Permission`-flavored `Decl`, so [`crate::loader::register_declarations`]
/// picks all of it up with no changes of its own.
pub fn parse_access_vectors_file(filename: &str, source: &str) -> Result<FileTree> {
    let mut tree = FileTree::new(filename, NodeFlavor::AvFile);
    let root = tree.root;
    let mut prev: Option<NodeId> = None;

    let tokens = tokenize_av_source(source);
    let mut i = 0;
    while i < tokens.len() {
        let (word, _) = &tokens[i];
        if word != "class" && word != "common" {
            i += 1;
            continue;
        }
        i += 1;
        let Some((name, name_line)) = tokens.get(i).cloned() else { break };
        i += 1;

        if tokens.get(i).map(|(w, _)| w.as_str()) == Some("inherits") {
            i += 2;
        }

        let class_id = append(
            &mut tree,
            prev,
            root,
            NodeFlavor::Decl,
            Payload::Decl(DeclData { flavor: DeclFlavor::Class, name, attrs_or_perms: StringList::new() }),
            name_line,
        );
        prev = Some(class_id);

        if tokens.get(i).map(|(w, _)| w.as_str()) == Some("{") {
            i += 1;
            while let Some((perm, perm_line)) = tokens.get(i).cloned() {
                i += 1;
                if perm == "}" {
                    break;
                }
                let perm_id = append(
                    &mut tree,
                    prev,
                    root,
                    NodeFlavor::Decl,
                    Payload::Decl(DeclData { flavor: DeclFlavor::Permission, name: perm, attrs_or_perms: StringList::new() }),
                    perm_line,
                );
                prev = Some(perm_id);
            }
        }
    }

    Ok(tree)
}

/// Strip `#`-comments line by line, then split into whitespace-delimited
/// tokens with `{`/`}` pulled out as tokens of their own, each tagged
/// with the source line it came from.
fn tokenize_av_source(source: &str) -> Vec<(String, u32)> {
    let mut tokens = Vec::new();
    for (i, raw_line) in source.lines().enumerate() {
        let lineno = (i + 1) as u32;
        let (code, _) = split_comment(raw_line);
        let spaced = code.replace('{', " { ").replace('}', " } ");
        for word in spaced.split_whitespace() {
            tokens.push((word.to_string(), lineno));
        }
    }
    tokens
}

fn append(tree: &mut FileTree, prev: Option<NodeId>, parent: NodeId, flavor: NodeFlavor, payload: Payload, lineno: u32) -> NodeId {
    match prev {
        Some(p) => tree.insert_next(p, flavor, payload, lineno),
        None => tree.insert_child(parent, flavor, payload, lineno),
    }
}

fn split_comment(line: &str) -> (&str, Option<&str>) {
    match line.find('#') {
        Some(i) => (&line[..i], Some(line[i + 1..].trim())),
        None => (line, None),
    }
}

fn attach_disable_comment(tree: &mut FileTree, id: NodeId, comment: Option<&str>) {
    let Some(text) = comment else { return };
    let Some(rest) = text.strip_prefix("selint-disable:") else { return };
    for name in rest.split(',') {
        let name = name.trim();
        if !name.is_empty() {
            tree.get_mut(id).exceptions.push(name.to_string());
        }
    }
}

fn strip_quotes(s: &str) -> &str {
    s.trim().trim_matches(|c| c == '`' || c == '\'').trim()
}

/// Splits on `sep` only where paren depth is zero, so a `gen_context(...)`
/// argument's internal commas don't get mistaken for list separators.
fn split_top_level(s: &str, sep: char) -> Vec<String> {
    let mut out = Vec::new();
    let mut depth = 0i32;
    let mut cur = String::new();
    for ch in s.chars() {
        match ch {
            '(' => {
                depth += 1;
                cur.push(ch);
            }
            ')' => {
                depth -= 1;
                cur.push(ch);
            }
            c if c == sep && depth == 0 => out.push(std::mem::take(&mut cur)),
            c => cur.push(c),
        }
    }
    out.push(cur);
    out
}

// ---------------------------------------------------------------------
// .fc parsing
// ---------------------------------------------------------------------

/// `<path> [-<objclass>] <context>`, per `parse_fc_line` in the original
/// `.fc` grammar: a path token, an optional single-char object-class
/// token introduced by `-`, then the context.
fn fc_path(input: &str) -> IResult<&str, &str> {
    take_till1(|c: char| c.is_whitespace())(input)
}

fn fc_object_class(input: &str) -> IResult<&str, char> {
    preceded(char('-'), one_of("bcdflps"))(input)
}

fn fc_line(input: &str) -> IResult<&str, FcEntryData> {
    let (input, path) = fc_path(input)?;
    let (input, _) = multispace1(input)?;
    let (input, object_class) = opt(terminated(fc_object_class, multispace1))(input)?;
    let (input, context) = fc_context(input)?;
    Ok((input, FcEntryData { path: path.to_string(), object_class, context: Some(context) }))
}

fn parse_fc_entry_line(code: &str) -> Option<FcEntryData> {
    fc_line(code).ok().map(|(_, data)| data)
}

/// `<<none>>` | `gen_context(user:role:type[,range_low[,range_high]])` |
/// a raw `user:role:type[:range]` context, per `parse_context`.
fn fc_context(input: &str) -> IResult<&str, FcContext> {
    alt((map(tag("<<none>>"), |_| FcContext::None), fc_gen_context, fc_raw_context))(input)
}

fn fc_gen_context(input: &str) -> IResult<&str, FcContext> {
    map_opt(
        delimited(tag("gen_context("), is_not(")"), char(')')),
        |inner: &str| {
            let parts = split_top_level(inner, ',');
            let (user, role, type_name) = split_colon_triplet(parts.first()?.trim())?;
            let range = match parts.len() {
                1 => None,
                2 => Some(parts[1].trim().to_string()),
                _ => Some(format!("{}:{}", parts[1].trim(), parts[2].trim())),
            };
            Some(FcContext::GenContext { user, role, type_name, range })
        },
    )(input)
}

fn fc_raw_context(input: &str) -> IResult<&str, FcContext> {
    map_opt(rest, |s: &str| {
        let (user, role, type_name, range) = split_colon_quad(s.trim())?;
        Some(FcContext::Raw { user, role, type_name, range })
    })(input)
}

fn split_colon_triplet(s: &str) -> Option<(String, String, String)> {
    let f: Vec<&str> = s.split(':').collect();
    if f.len() < 3 {
        return None;
    }
    Some((f[0].to_string(), f[1].to_string(), f[2].to_string()))
}

fn split_colon_quad(s: &str) -> Option<(String, String, String, Option<String>)> {
    let f: Vec<&str> = s.split(':').collect();
    if f.len() < 3 {
        return None;
    }
    let range = if f.len() > 3 { Some(f[3..].join(":")) } else { None };
    Some((f[0].to_string(), f[1].to_string(), f[2].to_string(), range))
}

// ---------------------------------------------------------------------
// .te / .if parsing
// ---------------------------------------------------------------------

/// Consumes `body` as a sequence of top-level statements under `parent`,
/// tracking paren/brace depth to find each statement's extent.
fn parse_block(tree: &mut FileTree, parent: NodeId, body: &str, start_line: u32) {
    let mut prev: Option<NodeId> = None;
    let mut paren_depth = 0i32;
    let mut brace_depth = 0i32;
    let mut buf = String::new();
    let mut stmt_start_line = start_line;
    let mut lineno = start_line;

    for raw_line in body.lines() {
        if buf.is_empty() {
            stmt_start_line = lineno;
        }

        let (code, comment) = split_comment(raw_line);

        if buf.is_empty() && code.trim().is_empty() {
            if let Some(text) = comment {
                prev = Some(append(tree, prev, parent, NodeFlavor::Comment, Payload::Comment(text.to_string()), lineno));
            }
            lineno += 1;
            continue;
        }

        if !buf.is_empty() {
            buf.push('\n');
        }
        buf.push_str(code);

        for ch in code.chars() {
            match ch {
                '(' => paren_depth += 1,
                ')' => paren_depth -= 1,
                '{' => brace_depth += 1,
                '}' => brace_depth -= 1,
                _ => {}
            }
        }

        let trimmed = code.trim_end();
        let closed = paren_depth <= 0
            && brace_depth <= 0
            && (trimmed.ends_with(';') || trimmed.ends_with('}') || trimmed.ends_with(')'));

        if closed {
            paren_depth = 0;
            brace_depth = 0;
            let stmt = std::mem::take(&mut buf);
            let stmt = stmt.trim();
            if !stmt.is_empty() {
                if let Some(id) = parse_statement(tree, parent, prev, stmt, stmt_start_line) {
                    attach_disable_comment(tree, id, comment);
                    prev = Some(id);
                }
            }
        }

        lineno += 1;
    }

    let remainder = buf.trim().to_string();
    if !remainder.is_empty() {
        parse_statement(tree, parent, prev, &remainder, stmt_start_line);
    }
}

fn call_name_and_args(stmt: &str) -> Option<(&str, &str)> {
    let stmt = stmt.trim_end_matches(';').trim();
    let open = stmt.find('(')?;
    let close = stmt.rfind(')')?;
    if close < open {
        return None;
    }
    Some((stmt[..open].trim(), &stmt[open + 1..close]))
}

fn call_args(inner: &str) -> Vec<String> {
    split_top_level(inner, ',').iter().map(|a| strip_quotes(a).to_string()).collect()
}

fn split_first_field(s: &str) -> (&str, &str) {
    let s = s.trim_start();
    if let Some(rest) = s.strip_prefix('{') {
        if let Some(end) = rest.find('}') {
            return (&s[..end + 2], s[end + 2..].trim_start());
        }
    }
    match s.find(char::is_whitespace) {
        Some(i) => (&s[..i], s[i..].trim_start()),
        None => (s, ""),
    }
}

fn parse_name_list(field: &str) -> StringList {
    let field = field.trim();
    let mut list = StringList::new();
    let mut rest = field;

    if let Some(r) = rest.strip_prefix('~') {
        list.push(StringItem::new("~"));
        rest = r.trim_start();
    } else if let Some(r) = rest.strip_prefix('-') {
        list.push(StringItem::new("-"));
        rest = r.trim_start();
    }

    let inner = rest.strip_prefix('{').and_then(|r| r.strip_suffix('}')).unwrap_or(rest);
    for word in inner.split_whitespace() {
        let word = word.trim_matches(',');
        if !word.is_empty() {
            list.push(StringItem::new(word));
        }
    }

    list
}

fn parse_call_arg(arg: &str) -> StringList {
    let trimmed = strip_quotes(arg);
    let mut list = StringList::new();
    for (i, word) in trimmed.split_whitespace().enumerate() {
        let mut item = StringItem::new(word);
        if i > 0 {
            item.has_incorrect_space = true;
            item.arg_start = false;
        }
        list.push(item);
    }
    list
}

fn identifiers_in_condition(cond: &str) -> StringList {
    let mut list = StringList::new();
    let mut word = String::new();
    for ch in cond.chars() {
        if ch.is_alphanumeric() || ch == '_' {
            word.push(ch);
        } else if !word.is_empty() {
            list.push(StringItem::new(std::mem::take(&mut word)));
        }
    }
    if !word.is_empty() {
        list.push(StringItem::new(word));
    }
    list
}

fn parse_statement(tree: &mut FileTree, parent: NodeId, prev: Option<NodeId>, stmt: &str, lineno: u32) -> Option<NodeId> {
    let put = |tree: &mut FileTree, flavor: NodeFlavor, payload: Payload| -> NodeId {
        append(tree, prev, parent, flavor, payload, lineno)
    };

    if stmt == ";" {
        return Some(put(tree, NodeFlavor::Semicolon, Payload::None));
    }

    if let Some((name, inner)) = call_name_and_args(stmt) {
        let args = call_args(inner);

        match name {
            "policy_module" => {
                let module_name = args.first().cloned().unwrap_or_default();
                return Some(put(tree, NodeFlavor::Header, Payload::Header(HeaderData { module_name, is_macro_form: true })));
            }
            "interface" | "template" => {
                let decl_name = args.first().cloned().unwrap_or_default();
                let body = args.get(1).cloned().unwrap_or_default();
                let flavor = if name == "interface" { NodeFlavor::InterfaceDef } else { NodeFlavor::TempDef };
                let id = put(tree, flavor, Payload::InterfaceDef(InterfaceDefData { name: decl_name }));
                parse_block(tree, id, &body, 1);
                return Some(id);
            }
            "gen_require" => {
                let raw = args.first().cloned().unwrap_or_default();
                let unquoted = !inner.trim().starts_with('`');
                let id = put(tree, NodeFlavor::GenReq, Payload::GenReq(GenReqData { unquoted }));
                parse_block(tree, id, &raw, 1);
                return Some(id);
            }
            "optional_policy" => {
                let true_branch = args.first().cloned().unwrap_or_default();
                let id = put(tree, NodeFlavor::OptionalPolicy, Payload::None);
                parse_block(tree, id, &true_branch, 1);
                if let Some(false_branch) = args.get(1) {
                    let else_id = tree.insert_next(id, NodeFlavor::OptionalElse, Payload::None, lineno);
                    parse_block(tree, else_id, false_branch, 1);
                    return Some(else_id);
                }
                return Some(id);
            }
            "tunable_policy" => {
                let cond = args.first().cloned().unwrap_or_default();
                let id = put(tree, NodeFlavor::TunablePolicy, Payload::CondDecl(CondDeclData { identifiers: identifiers_in_condition(&cond) }));
                if let Some(true_branch) = args.get(1) {
                    parse_block(tree, id, true_branch, 1);
                }
                if let Some(false_branch) = args.get(2) {
                    parse_block(tree, id, false_branch, 1);
                }
                return Some(id);
            }
            "ifdef" => {
                let id = put(tree, NodeFlavor::Ifdef, Payload::None);
                if let Some(body) = args.get(1) {
                    parse_block(tree, id, body, 1);
                }
                return Some(id);
            }
            "define" => {
                let macro_name = args.first().cloned().unwrap_or_default();
                let perms = args.get(1).map(|s| parse_name_list(s)).unwrap_or_default();
                return Some(put(tree, NodeFlavor::Define, Payload::AttributeStmt(AttributeStmtData { name: macro_name, attrs: perms })));
            }
            "gen_bool" => {
                let bool_name = args.first().cloned().unwrap_or_default();
                let default_value = args.get(1).cloned().unwrap_or_default();
                return Some(put(tree, NodeFlavor::Decl, Payload::Decl(DeclData {
                    flavor: DeclFlavor::Bool,
                    name: bool_name,
                    attrs_or_perms: StringList::single(default_value),
                })));
            }
            _ => {
                let callee = name.to_string();
                let parsed_args = args.iter().map(|a| parse_call_arg(a)).collect();
                return Some(put(tree, NodeFlavor::IfCall, Payload::IfCall(IfCallData { callee, args: parsed_args })));
            }
        }
    }

    if let Some(rest) = stmt.strip_prefix("module ") {
        let mut tokens = rest.split_whitespace();
        let module_name = tokens.next().unwrap_or_default().to_string();
        return Some(put(tree, NodeFlavor::Header, Payload::Header(HeaderData { module_name, is_macro_form: false })));
    }

    if let Some(rest) = strip_brace_header(stmt, "require") {
        let id = put(tree, NodeFlavor::Require, Payload::None);
        parse_block(tree, id, rest, 1);
        return Some(id);
    }

    if let Some(id) = parse_if_statement(tree, parent, prev, stmt, lineno) {
        return Some(id);
    }

    if let Some(rest) = stmt.strip_prefix("type ") {
        return Some(put(tree, NodeFlavor::Decl, Payload::Decl(parse_simple_decl(DeclFlavor::Type, rest))));
    }
    if let Some(rest) = stmt.strip_prefix("attribute ") {
        return Some(put(tree, NodeFlavor::Decl, Payload::Decl(parse_simple_decl(DeclFlavor::TypeAttribute, rest))));
    }
    if let Some(rest) = stmt.strip_prefix("attribute_role ") {
        return Some(put(tree, NodeFlavor::Decl, Payload::Decl(parse_simple_decl(DeclFlavor::RoleAttribute, rest))));
    }
    if let Some(rest) = stmt.strip_prefix("bool ") {
        return Some(put(tree, NodeFlavor::Decl, Payload::Decl(parse_simple_decl(DeclFlavor::Bool, rest))));
    }
    if let Some(rest) = stmt.strip_prefix("class ") {
        return Some(put(tree, NodeFlavor::Decl, Payload::Decl(parse_simple_decl(DeclFlavor::Class, rest))));
    }
    if let Some(rest) = stmt.strip_prefix("typealias ") {
        if let Some((target, alias)) = rest.split_once(" alias ") {
            return Some(put(tree, NodeFlavor::TypeAlias, Payload::Alias(AliasData {
                alias_name: alias.trim_end_matches(';').trim().to_string(),
                target_name: target.trim().to_string(),
            })));
        }
    }
    if let Some(rest) = stmt.strip_prefix("typeattribute ") {
        return Some(put(tree, NodeFlavor::TypeAttribute, Payload::AttributeStmt(parse_attribute_stmt(rest))));
    }
    if let Some(rest) = stmt.strip_prefix("roleattribute ") {
        return Some(put(tree, NodeFlavor::RoleAttribute, Payload::AttributeStmt(parse_attribute_stmt(rest))));
    }
    if let Some(rest) = stmt.strip_prefix("permissive ") {
        let type_name = rest.trim_end_matches(';').trim().to_string();
        return Some(put(tree, NodeFlavor::Permissive, Payload::Permissive(PermissiveData { type_name })));
    }
    if let Some(rest) = stmt.strip_prefix("role ") {
        if let Some((role, types)) = rest.split_once(" types ") {
            return Some(put(tree, NodeFlavor::RoleTypes, Payload::RoleTypes(RoleTypesData {
                role: role.trim().to_string(),
                types: parse_name_list(types.trim_end_matches(';')),
            })));
        }
        return Some(put(tree, NodeFlavor::Decl, Payload::Decl(parse_simple_decl(DeclFlavor::Role, rest))));
    }

    if let Some(rest) = stmt.strip_prefix("type_transition ") {
        return parse_tt_statement(tree, parent, prev, TransitionKind::Tt, rest, lineno);
    }
    if let Some(rest) = stmt.strip_prefix("type_member ") {
        return parse_tt_statement(tree, parent, prev, TransitionKind::Tm, rest, lineno);
    }
    if let Some(rest) = stmt.strip_prefix("type_change ") {
        return parse_tt_statement(tree, parent, prev, TransitionKind::Tc, rest, lineno);
    }
    if let Some(rest) = stmt.strip_prefix("role_transition ") {
        if let Some(data) = parse_rt_rule(rest) {
            return Some(put(tree, NodeFlavor::RtRule, Payload::RtRule(data)));
        }
    }

    for (prefix, flavor) in [
        ("allow ", AvRuleFlavor::Allow),
        ("dontaudit ", AvRuleFlavor::DontAudit),
        ("auditallow ", AvRuleFlavor::AuditAllow),
        ("neverallow ", AvRuleFlavor::NeverAllow),
    ] {
        if let Some(rest) = stmt.strip_prefix(prefix) {
            if rest.contains(':') {
                if let Some(data) = parse_av_rule(flavor, rest) {
                    return Some(put(tree, NodeFlavor::AvRule, Payload::AvRule(data)));
                }
            } else {
                let body = rest.trim_end_matches(';').trim();
                let (source_str, target_str) = split_first_field(body);
                return Some(put(tree, NodeFlavor::RoleAllow, Payload::RoleAllow(RoleAllowData {
                    sources: NameList::from_strings(&parse_name_list(source_str), NameFlavor::Role),
                    targets: NameList::from_strings(&parse_name_list(target_str), NameFlavor::Role),
                })));
            }
        }
    }

    for (prefix, flavor) in [
        ("allowxperm ", AvRuleFlavor::Allow),
        ("dontauditxperm ", AvRuleFlavor::DontAudit),
        ("auditallowxperm ", AvRuleFlavor::AuditAllow),
        ("neverallowxperm ", AvRuleFlavor::NeverAllow),
    ] {
        if let Some(rest) = stmt.strip_prefix(prefix) {
            if let Some(data) = parse_xav_rule(flavor, rest) {
                return Some(put(tree, NodeFlavor::XavRule, Payload::XavRule(data)));
            }
        }
    }

    // A bare identifier with no parens and no recognized keyword: most
    // likely a plain m4 macro invoked without arguments.
    let bare = stmt.trim_end_matches(';').trim();
    if !bare.is_empty() && bare.chars().all(|c| c.is_alphanumeric() || c == '_') {
        return Some(put(tree, NodeFlavor::M4SimpleMacro, Payload::Comment(bare.to_string())));
    }

    log::debug!("{}:{lineno}: unrecognized statement: {stmt}", tree.filename);
    Some(put(tree, NodeFlavor::Error, Payload::ErrorText(stmt.to_string())))
}

fn strip_brace_header<'a>(stmt: &'a str, keyword: &str) -> Option<&'a str> {
    let rest = stmt.strip_prefix(keyword)?;
    let rest = rest.trim_start();
    let rest = rest.strip_prefix('{')?;
    let close = rest.rfind('}')?;
    Some(&rest[..close])
}

/// `if (cond) { ... } [else { ... }]`. Unlike [`strip_brace_header`], the
/// opening brace here is preceded by a parenthesized condition rather
/// than following the keyword directly, so this gets its own extraction.
fn parse_if_statement(tree: &mut FileTree, parent: NodeId, prev: Option<NodeId>, stmt: &str, lineno: u32) -> Option<NodeId> {
    let rest = stmt.strip_prefix("if")?.trim_start();
    let rest = rest.strip_prefix('(')?;
    let close_paren = rest.find(')')?;
    let cond = &rest[..close_paren];
    let after = rest[close_paren + 1..].trim_start();
    let after = after.strip_prefix('{')?;
    let close_brace = after.rfind('}')?;
    let body = &after[..close_brace];
    let trailing = after[close_brace + 1..].trim();

    let id = append(
        tree,
        prev,
        parent,
        NodeFlavor::BooleanPolicy,
        Payload::CondDecl(CondDeclData { identifiers: identifiers_in_condition(cond) }),
        lineno,
    );
    parse_block(tree, id, body, 1);

    if let Some(else_body) = trailing.strip_prefix("else").map(str::trim_start) {
        if let Some(else_body) = else_body.strip_prefix('{').and_then(|s| s.strip_suffix('}')) {
            parse_block(tree, id, else_body, 1);
        }
    }

    Some(id)
}

fn parse_simple_decl(flavor: DeclFlavor, rest: &str) -> DeclData {
    let rest = rest.trim_end_matches(';').trim();
    let (name, tail) = split_first_field(rest);
    let name = name.trim_matches(',').to_string();
    DeclData { flavor, name, attrs_or_perms: parse_name_list(tail) }
}

fn parse_attribute_stmt(rest: &str) -> AttributeStmtData {
    let rest = rest.trim_end_matches(';').trim();
    let (name, tail) = split_first_field(rest);
    AttributeStmtData { name: name.trim_matches(',').to_string(), attrs: parse_name_list(tail) }
}

fn parse_av_rule(flavor: AvRuleFlavor, stmt_body: &str) -> Option<AvRuleData> {
    let body = stmt_body.trim_end_matches(';').trim();
    let (left, right) = body.split_once(':')?;
    let (source_str, target_str) = split_first_field(left);
    let (class_str, perm_str) = split_first_field(right);
    Some(AvRuleData {
        flavor,
        sources: parse_name_list(source_str),
        targets: parse_name_list(target_str),
        classes: parse_name_list(class_str),
        perms: parse_name_list(perm_str),
    })
}

fn parse_xav_rule(flavor: AvRuleFlavor, stmt_body: &str) -> Option<XavRuleData> {
    let body = stmt_body.trim_end_matches(';').trim();
    let (left, right) = body.split_once(':')?;
    let (source_str, target_str) = split_first_field(left);
    let (class_str, rest) = split_first_field(right);
    let (operation, perm_str) = split_first_field(rest);
    Some(XavRuleData {
        flavor,
        sources: parse_name_list(source_str),
        targets: parse_name_list(target_str),
        classes: parse_name_list(class_str),
        operation: operation.to_string(),
        perms: parse_name_list(perm_str),
    })
}

fn parse_tt_statement(tree: &mut FileTree, parent: NodeId, prev: Option<NodeId>, kind: TransitionKind, rest: &str, lineno: u32) -> Option<NodeId> {
    let data = parse_tt_rule(kind, rest)?;
    Some(append(tree, prev, parent, NodeFlavor::TtRule, Payload::TtRule(data), lineno))
}

fn parse_tt_rule(kind: TransitionKind, stmt_body: &str) -> Option<TtRuleData> {
    let body = stmt_body.trim_end_matches(';').trim();
    let (left, right) = body.split_once(':')?;
    let (source_str, target_str) = split_first_field(left);
    let mut tokens = right.split_whitespace();
    let class = tokens.next()?.to_string();
    let default_type = tokens.next()?.trim_matches('"').to_string();
    let object_name = tokens.next().map(|s| s.trim_matches('"').to_string());
    Some(TtRuleData {
        kind,
        sources: parse_name_list(source_str),
        targets: parse_name_list(target_str),
        classes: StringList::single(class),
        default_type,
        object_name,
    })
}

fn parse_rt_rule(stmt_body: &str) -> Option<RtRuleData> {
    let body = stmt_body.trim_end_matches(';').trim();
    let (left, right) = body.split_once(':')?;
    let (source_str, target_str) = split_first_field(left);
    let mut tokens = right.split_whitespace();
    let class = tokens.next()?.to_string();
    let default_role = tokens.next()?.to_string();
    Some(RtRuleData {
        sources: parse_name_list(source_str),
        targets: parse_name_list(target_str),
        classes: StringList::single(class),
        default_role,
    })
}

/// Surfaced for callers (the CLI front-end) that want a uniform error
/// when an entire file fails to produce a usable tree; the line/token
/// combinators above are infallible by construction (unrecognized
/// syntax becomes an `Error` node rather than aborting the parse), so
/// this is currently only reachable from future stricter parse modes.
#[allow(dead_code)]
fn parse_error(message: impl Into<String>) -> Error {
    Error::with_kind(ErrorKind::ParseError, message.into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_log::test;

    #[test]
    fn parses_a_simple_allow_rule() {
        let tree = parse_te_file("foo.te", "allow foo_t bar_t:file { read write };\n").unwrap();
        let id = tree.first_meaningful_child(tree.root).expect("one statement");
        let Payload::AvRule(data) = &tree.get(id).payload else { panic!("expected an av rule") };
        assert_eq!(data.flavor, AvRuleFlavor::Allow);
        assert_eq!(data.sources.first().unwrap().text, "foo_t");
        assert_eq!(data.targets.first().unwrap().text, "bar_t");
        assert_eq!(data.classes.first().unwrap().text, "file");
        assert_eq!(data.perms.len(), 2);
    }

    #[test]
    fn parses_a_policy_module_header() {
        let tree = parse_te_file("foo.te", "policy_module(foo, 1.0.0)\n").unwrap();
        let id = tree.first_meaningful_child(tree.root).unwrap();
        let Payload::Header(data) = &tree.get(id).payload else { panic!("expected a header") };
        assert_eq!(data.module_name, "foo");
        assert!(data.is_macro_form);
    }

    #[test]
    fn parses_an_interface_definition_with_a_nested_rule() {
        let source = "interface(`foo_domtrans',`\n\tallow $1 foo_t:process transition;\n')\n";
        let tree = parse_if_file("foo.if", source).unwrap();
        let id = tree.first_meaningful_child(tree.root).unwrap();
        let Payload::InterfaceDef(data) = &tree.get(id).payload else { panic!("expected an interface def") };
        assert_eq!(data.name, "foo_domtrans");
        let child = tree.first_meaningful_child(id).expect("nested rule");
        assert!(matches!(tree.get(child).payload, Payload::AvRule(_)));
    }

    #[test]
    fn parses_a_require_block() {
        let source = "require {\n\ttype foo_t;\n\tclass file read;\n}\n";
        let tree = parse_te_file("foo.te", source).unwrap();
        let id = tree.first_meaningful_child(tree.root).unwrap();
        assert_eq!(tree.get(id).flavor, NodeFlavor::Require);
        let child = tree.first_meaningful_child(id).unwrap();
        assert!(matches!(tree.get(child).payload, Payload::Decl(_)));
    }

    #[test]
    fn parses_an_fc_entry_with_gen_context() {
        let tree = parse_fc_file("foo.fc", "/etc/foo(/.*)?  gen_context(system_u:object_r:foo_etc_t,s0)\n").unwrap();
        let id = tree.first_meaningful_child(tree.root).unwrap();
        let Payload::FcEntry(data) = &tree.get(id).payload else { panic!("expected an fc entry") };
        assert_eq!(data.path, "/etc/foo(/.*)?");
        match data.context.as_ref().unwrap() {
            FcContext::GenContext { type_name, range, .. } => {
                assert_eq!(type_name, "foo_etc_t");
                assert_eq!(range.as_deref(), Some("s0"));
            }
            other => panic!("expected a gen_context, got {other:?}"),
        }
    }

    #[test]
    fn parses_a_define_call_into_a_permission_macro() {
        let tree = parse_if_file("obj_perm_sets.spt", "define(`foo_read', { read getattr open })\n").unwrap();
        let id = tree.first_meaningful_child(tree.root).unwrap();
        assert_eq!(tree.get(id).flavor, NodeFlavor::Define);
        let Payload::AttributeStmt(data) = &tree.get(id).payload else { panic!("expected an attribute stmt") };
        assert_eq!(data.name, "foo_read");
        assert_eq!(data.attrs.iter().map(|i| i.text.as_str()).collect::<Vec<_>>(), vec!["read", "getattr", "open"]);
    }

    #[test]
    fn parses_access_vectors_classes_and_permissions() {
        let source = "\
common file\n{\n\tioctl\n\tread\n}\n\nclass dir\ninherits file\n{\n\tadd_name\n\tremove_name\n}\n";
        let tree = parse_access_vectors_file("access_vectors", source).unwrap();

        let decls: Vec<&DeclData> = tree
            .iter_dfs()
            .filter_map(|id| match &tree.get(id).payload {
                Payload::Decl(data) => Some(data),
                _ => None,
            })
            .collect();

        let classes: Vec<&str> = decls.iter().filter(|d| d.flavor == DeclFlavor::Class).map(|d| d.name.as_str()).collect();
        assert_eq!(classes, vec!["file", "dir"]);

        let perms: Vec<&str> = decls.iter().filter(|d| d.flavor == DeclFlavor::Permission).map(|d| d.name.as_str()).collect();
        assert_eq!(perms, vec!["ioctl", "read", "add_name", "remove_name"]);
    }

    #[test]
    fn disable_comment_attaches_an_exception() {
        let tree = parse_te_file("foo.te", "allow foo_t bar_t:file read; # selint-disable:W-008\n").unwrap();
        let id = tree.first_meaningful_child(tree.root).unwrap();
        assert_eq!(tree.get(id).exceptions, vec!["W-008".to_string()]);
    }
}
