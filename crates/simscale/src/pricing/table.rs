//! Extraction of the VM price table from the HTML page of the price source.
//!
//! The page is split into a flat stream of tags and text with a small `nom` tokenizer,
//! the first `<table>` that carries a heading row is then assembled from that stream.

use nom::branch::alt;
use nom::bytes::complete::{tag, take_till1, take_until, take_while1};
use nom::character::complete::char;
use nom::combinator::{map, opt, value};
use nom::sequence::{delimited, preceded, terminated, tuple};
use nom::IResult;

use crate::common::config::HostOs;
use crate::common::error::SimScaleError;
use crate::common::utils::str::parse_decimal;

#[derive(Debug, Clone, PartialEq)]
enum Token<'a> {
    Open(String),
    Close(String),
    Text(&'a str),
    Skip,
}

type TokenResult<'a> = IResult<&'a str, Token<'a>>;

fn p_comment(input: &str) -> TokenResult<'_> {
    value(
        Token::Skip,
        delimited(tag("<!--"), take_until("-->"), tag("-->")),
    )(input)
}

fn p_declaration(input: &str) -> TokenResult<'_> {
    value(
        Token::Skip,
        delimited(tag("<!"), take_until(">"), char('>')),
    )(input)
}

fn p_tag(input: &str) -> TokenResult<'_> {
    map(
        preceded(
            char('<'),
            terminated(
                tuple((
                    opt(char('/')),
                    take_while1(|c: char| c.is_ascii_alphanumeric()),
                )),
                terminated(take_until(">"), char('>')),
            ),
        ),
        |(closing, name): (Option<char>, &str)| {
            let name = name.to_ascii_lowercase();
            if closing.is_some() {
                Token::Close(name)
            } else {
                Token::Open(name)
            }
        },
    )(input)
}

fn p_text(input: &str) -> TokenResult<'_> {
    map(take_till1(|c: char| c == '<'), Token::Text)(input)
}

fn p_stray_bracket(input: &str) -> TokenResult<'_> {
    map(tag("<"), Token::Text)(input)
}

fn p_token(input: &str) -> TokenResult<'_> {
    alt((p_comment, p_declaration, p_tag, p_text, p_stray_bracket))(input)
}

fn tokenize(mut input: &str) -> Vec<Token<'_>> {
    let mut tokens = Vec::new();
    while !input.is_empty() {
        match p_token(input) {
            Ok((rest, token)) => {
                if token != Token::Skip {
                    tokens.push(token);
                }
                input = rest;
            }
            // Unterminated comment or tag at the end of the document
            Err(_) => break,
        }
    }
    tokens
}

fn decode_entities(text: &str) -> String {
    text.replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&#36;", "$")
        .replace("&amp;", "&")
}

fn normalize_text(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[derive(Default)]
struct TableBuilder {
    headings: Vec<String>,
    rows: Vec<Vec<String>>,
    row: Option<(Vec<String>, bool)>,
    cell: Option<(String, bool)>,
}

impl TableBuilder {
    fn open_cell(&mut self, is_heading: bool) {
        self.close_cell();
        if self.row.is_none() {
            self.row = Some((Vec::new(), true));
        }
        self.cell = Some((String::new(), is_heading));
    }

    fn close_cell(&mut self) {
        let Some((text, is_heading)) = self.cell.take() else {
            return;
        };
        if let Some((cells, all_headings)) = self.row.as_mut() {
            cells.push(normalize_text(&decode_entities(&text)));
            *all_headings &= is_heading;
        }
    }

    fn close_row(&mut self) {
        self.close_cell();
        if let Some((cells, all_headings)) = self.row.take() {
            if cells.is_empty() {
                return;
            }
            if all_headings && self.headings.is_empty() {
                self.headings = cells;
            } else if !all_headings {
                self.rows.push(cells);
            }
        }
    }

    fn push_text(&mut self, text: &str) {
        if let Some((cell, _)) = self.cell.as_mut() {
            cell.push_str(text);
        }
    }

    fn finish(mut self) -> PriceTable {
        self.close_row();
        PriceTable {
            headings: self.headings,
            rows: self.rows,
        }
    }
}

/// Headings and text rows of an HTML table.
#[derive(Debug, Clone, PartialEq)]
pub struct PriceTable {
    pub headings: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl PriceTable {
    /// Returns the first table of the document that has a heading row.
    pub fn parse_html(html: &str) -> crate::Result<PriceTable> {
        let mut builder: Option<TableBuilder> = None;
        let mut skipped_element: Option<String> = None;

        for token in tokenize(html) {
            if let Some(name) = &skipped_element {
                if matches!(&token, Token::Close(closing) if closing == name) {
                    skipped_element = None;
                }
                continue;
            }
            match token {
                Token::Open(name) if name == "script" || name == "style" => {
                    skipped_element = Some(name);
                }
                Token::Open(name) if name == "table" => {
                    builder = Some(TableBuilder::default());
                }
                Token::Close(name) if name == "table" => {
                    if let Some(table) = builder.take().map(|b| b.finish()) {
                        if !table.headings.is_empty() {
                            return Ok(table);
                        }
                    }
                }
                token => {
                    let Some(builder) = builder.as_mut() else {
                        continue;
                    };
                    match token {
                        Token::Open(name) if name == "tr" => {
                            builder.close_row();
                            builder.row = Some((Vec::new(), true));
                        }
                        Token::Close(name) if name == "tr" => builder.close_row(),
                        Token::Open(name) if name == "th" => builder.open_cell(true),
                        Token::Open(name) if name == "td" => builder.open_cell(false),
                        Token::Close(name) if name == "th" || name == "td" => {
                            builder.close_cell()
                        }
                        Token::Open(name) if name == "br" => builder.push_text(" "),
                        Token::Text(text) => builder.push_text(text),
                        _ => {}
                    }
                }
            }
        }

        if let Some(table) = builder.map(|b| b.finish()) {
            if !table.headings.is_empty() {
                return Ok(table);
            }
        }
        Err(SimScaleError::PricingUnavailable(
            "Price page does not contain a table with headings".to_string(),
        ))
    }

    /// Indices of columns that do not belong to the opposite operating system.
    fn kept_columns(&self, host_os: HostOs) -> Vec<usize> {
        let opposite = host_os.opposite().as_str();
        self.headings
            .iter()
            .enumerate()
            .filter(|(_, heading)| !heading.to_ascii_lowercase().contains(opposite))
            .map(|(index, _)| index)
            .collect()
    }

    fn column_containing(&self, columns: &[usize], needle: &str) -> Option<usize> {
        columns
            .iter()
            .copied()
            .find(|&index| self.headings[index].to_ascii_lowercase().contains(needle))
    }

    /// Hourly price of `vm_sku` for the given OS. The lowest price wins when the
    /// table lists the size more than once.
    pub fn find_price(&self, vm_sku: &str, host_os: HostOs) -> crate::Result<f64> {
        let columns = self.kept_columns(host_os);
        let name_column = self
            .column_containing(&columns, "name")
            .or_else(|| columns.first().copied())
            .ok_or_else(|| SimScaleError::NotFound(format!("No columns for {host_os}")))?;
        let price_column = columns
            .iter()
            .copied()
            .filter(|&index| index != name_column)
            .find(|&index| self.headings[index].to_ascii_lowercase().contains("price"))
            .or_else(|| columns.get(3).copied())
            .ok_or_else(|| {
                SimScaleError::NotFound(format!("No price column for {host_os} in the price table"))
            })?;

        self.rows
            .iter()
            .filter(|row| {
                row.get(name_column)
                    .is_some_and(|name| name.eq_ignore_ascii_case(vm_sku))
            })
            .filter_map(|row| row.get(price_column).and_then(|cell| parse_decimal(cell)))
            .min_by(|a, b| a.total_cmp(b))
            .ok_or_else(|| {
                SimScaleError::NotFound(format!("No {host_os} price found for VM size {vm_sku}"))
            })
    }
}
