//! The pipeline driver.
//!
//! Splits a source text into `$`-terminated sub-programs, runs the four
//! stages over each in order, and owns every stage's log afterwards.
//! Stages gate each other: the parser always gets the token list, the
//! analyzer requires an error-free parse, and the generator requires an
//! error-free analysis. Sub-programs are fully independent; every stage
//! is a fresh value per unit.

use crate::ast::Node;
use crate::codegen::{self, MemoryMap, IMAGE_SIZE};
use crate::cst::CstNode;
use crate::diag::Log;
use crate::error::SourceMetadata;
use crate::grammar::{lexer::Lexer, Parser};
use crate::lowering;
use crate::semantic::{self, SymbolTable};

/// Everything one sub-program produced, stage by stage.
pub struct UnitOutcome {
    pub index: usize,
    pub lexer_log: Log,
    pub parser_log: Log,
    pub cst: Option<CstNode>,
    pub semantic_log: Log,
    pub symbols: SymbolTable,
    pub ast: Option<Node>,
    pub codegen_log: Log,
    pub image: [u8; IMAGE_SIZE],
    pub memory_map: MemoryMap,
}

/// The four text sinks, concatenated across sub-programs.
pub struct Reports {
    pub lexer: String,
    pub parser: String,
    pub semantic: String,
    pub codegen: String,
}

pub fn compile(source: &str) -> Vec<UnitOutcome> {
    split_programs(source)
        .into_iter()
        .enumerate()
        .map(|(index, (segment, first_line))| compile_unit(index, segment, first_line))
        .collect()
}

/// Segments terminated by `$` (the terminator stays with its segment so
/// the lexer sees it). Runs of `$` collapse; a trailing piece without a
/// terminator still compiles unless it is blank.
fn split_programs(source: &str) -> Vec<(&str, u32)> {
    let mut units = Vec::new();
    let mut start = 0usize;
    let mut line = 1u32;
    let mut line_at_start = 1u32;

    for (i, c) in source.char_indices() {
        match c {
            '\n' => line += 1,
            '$' => {
                if i > start {
                    units.push((&source[start..=i], line_at_start));
                }
                start = i + 1;
                line_at_start = line;
            }
            _ => {}
        }
    }

    let rest = &source[start..];
    if !rest.trim().is_empty() {
        units.push((rest, line_at_start));
    }
    units
}

fn compile_unit(index: usize, source: &str, first_line: u32) -> UnitOutcome {
    let meta = SourceMetadata::new(source).with_first_line(first_line);
    let lexed = Lexer::new(&meta).scan();
    let (tokens, lexer_log) = (lexed.tokens, lexed.log);

    let parsed = Parser::new(tokens, &meta).run();

    let (semantic_log, symbols, ast) = if parsed.log.has_errors() {
        let mut log = Log::new();
        log.info("Semantic analysis skipped due to parse errors");
        (log, SymbolTable::default(), None)
    } else {
        let analysis = semantic::analyze(lowering::lower(parsed.cst.as_ref()));
        (analysis.log, analysis.table, analysis.ast)
    };

    let (codegen_log, image, memory_map) = match &ast {
        Some(ast) if !semantic_log.has_errors() => {
            let generated = codegen::generate(ast);
            (generated.log, generated.image, generated.memory_map)
        }
        _ => {
            let mut log = Log::new();
            log.info("Code generation skipped due to earlier errors");
            (
                log,
                [0u8; IMAGE_SIZE],
                MemoryMap {
                    statics: Vec::new(),
                    strings: Vec::new(),
                },
            )
        }
    };

    UnitOutcome {
        index,
        lexer_log,
        parser_log: parsed.log,
        cst: parsed.cst,
        semantic_log,
        symbols,
        ast,
        codegen_log,
        image,
        memory_map,
    }
}

/// Renders the four sinks for a batch of compiled sub-programs.
pub fn reports(units: &[UnitOutcome]) -> Reports {
    let mut lexer = String::new();
    let mut parser = String::new();
    let mut semantic = String::new();
    let mut codegen_sink = String::new();

    for unit in units {
        let header = format!("--- Program {} ---\n", unit.index + 1);

        lexer.push_str(&header);
        lexer.push_str(&unit.lexer_log.render());

        parser.push_str(&header);
        parser.push_str(&unit.parser_log.render());
        if let Some(cst) = &unit.cst {
            parser.push('\n');
            parser.push_str(&cst.render());
        }

        semantic.push_str(&header);
        semantic.push_str(&unit.semantic_log.render());
        if let Some(ast) = &unit.ast {
            semantic.push('\n');
            semantic.push_str(&ast.render());
        }
        if !unit.symbols.is_empty() {
            semantic.push('\n');
            semantic.push_str(&unit.symbols.render());
        }

        codegen_sink.push_str(&header);
        codegen_sink.push_str(&unit.codegen_log.render());
        codegen_sink.push('\n');
        codegen_sink.push_str(&codegen::render_image(&unit.image));
        codegen_sink.push('\n');
        let map = unit.memory_map.to_string();
        if !map.is_empty() {
            codegen_sink.push_str(&map);
        }
    }

    Reports {
        lexer,
        parser,
        semantic,
        codegen: codegen_sink,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::NodeKind;
    use crate::codegen::STATIC_START;

    fn compile_one(source: &str) -> UnitOutcome {
        let mut units = compile(source);
        assert_eq!(units.len(), 1, "expected exactly one sub-program");
        units.remove(0)
    }

    #[test]
    fn empty_block_end_to_end() {
        let unit = compile_one("{}$");
        assert!(unit
            .lexer_log
            .entries()
            .iter()
            .any(|e| e.message == "Lex completed with 0 errors"));
        assert_eq!(unit.parser_log.error_count(), 0);

        let ast = unit.ast.as_ref().unwrap();
        match &ast.kind {
            NodeKind::Program { body } => match &body.kind {
                NodeKind::Block { statements } => assert!(statements.is_empty()),
                other => panic!("expected block, got {:?}", other),
            },
            other => panic!("expected program, got {:?}", other),
        }
        assert!(unit.symbols.is_empty());

        assert_eq!(&unit.image[..4], &[0xA9, 0x00, 0xEA, 0x00]);
        assert!(unit.image[4..].iter().all(|&b| b == 0));
    }

    #[test]
    fn single_declaration_end_to_end() {
        let unit = compile_one("{ int a }$");
        assert_eq!(unit.semantic_log.warning_count(), 1);
        assert!(!unit.semantic_log.has_errors());
        let rows = unit.symbols.rows();
        assert_eq!(rows.len(), 1);
        assert_eq!(
            (
                rows[0].name.as_str(),
                rows[0].ty,
                rows[0].initialized,
                rows[0].used,
                rows[0].scope,
                rows[0].position.line
            ),
            ("a", crate::ast::TypeName::Int, false, false, 1, 1)
        );
        // warnings do not block generation
        assert_eq!(unit.memory_map.statics, vec![("a".to_string(), STATIC_START)]);
        assert_eq!(unit.image[2], 0x8D);
    }

    #[test]
    fn assign_and_print_end_to_end() {
        let unit = compile_one("{ int a a = 3 print(a) }$");
        assert!(!unit.semantic_log.has_errors());
        assert_eq!(unit.semantic_log.warning_count(), 0);
        let rows = unit.symbols.rows();
        assert!(rows[0].initialized && rows[0].used);

        let lo = STATIC_START as u8;
        let fragment = [0xA9, 0x03, 0x8D, lo, 0x00, 0xAC, lo, 0x00, 0xA2, 0x01, 0xFF, 0x00];
        assert!(unit
            .image
            .windows(fragment.len())
            .any(|w| w == fragment));
        assert_eq!(unit.memory_map.statics, vec![("a".to_string(), 0x003C)]);
    }

    #[test]
    fn type_mismatch_blocks_generation() {
        let unit = compile_one("{ int a boolean b b = true a = b }$");
        assert!(unit.semantic_log.entries().iter().any(
            |e| e.message == "Type mismatch in assignment: Cannot assign boolean to int"
        ));
        assert!(unit.symbols.is_empty());
        assert!(unit.image.iter().all(|&b| b == 0));
        assert!(unit
            .codegen_log
            .entries()
            .iter()
            .any(|e| e.message.contains("skipped")));
    }

    #[test]
    fn shadowing_end_to_end() {
        let unit = compile_one("{ int a { int a } }$");
        assert!(!unit.semantic_log.has_errors());
        assert_eq!(unit.semantic_log.warning_count(), 2);
        let rows = unit.symbols.rows();
        assert_eq!(rows.len(), 2);
        assert_eq!((rows[0].scope, rows[1].scope), (1, 2));
    }

    #[test]
    fn if_with_string_print_end_to_end() {
        let unit = compile_one("{ if (1 == 1) { print(\"hi\") } }$");
        assert!(!unit.semantic_log.has_errors());
        // control flow fragment
        assert!(unit.image[..STATIC_START as usize].contains(&0xEC));
        assert!(unit.image[..STATIC_START as usize].contains(&0xD0));
        // "hi" sits at the heap base
        assert_eq!(&unit.image[0xE0..0xE3], &[0x68, 0x69, 0x00]);
        // printed via LDY #$E0 / LDX #$02 / SYS
        assert!(unit
            .image
            .windows(5)
            .any(|w| w == [0xA0, 0xE0, 0xA2, 0x02, 0xFF]));
    }

    #[test]
    fn sub_programs_compile_independently() {
        let units = compile("{ int a }$ { int a }$");
        assert_eq!(units.len(), 2);
        for unit in &units {
            assert!(!unit.semantic_log.has_errors());
            assert_eq!(unit.symbols.rows().len(), 1);
            assert_eq!(
                unit.memory_map.statics,
                vec![("a".to_string(), STATIC_START)]
            );
        }
    }

    #[test]
    fn failure_in_one_unit_does_not_block_the_next() {
        let units = compile("{ int a int a }$ {}$");
        assert_eq!(units.len(), 2);
        assert!(units[0].semantic_log.has_errors());
        assert!(!units[1].semantic_log.has_errors());
        assert_eq!(&units[1].image[..4], &[0xA9, 0x00, 0xEA, 0x00]);
    }

    #[test]
    fn dollar_runs_collapse_and_blanks_drop() {
        assert_eq!(compile("$$").len(), 0);
        assert_eq!(compile("{}$${}$").len(), 2);
        assert_eq!(compile("{}$\n").len(), 1);
    }

    #[test]
    fn whitespace_only_segment_still_lexes() {
        let units = compile(" \n $");
        assert_eq!(units.len(), 1);
        assert_eq!(units[0].lexer_log.error_count(), 0);
    }

    #[test]
    fn line_numbers_are_global_across_units() {
        let units = compile("{}$\n{ int a }$");
        assert_eq!(units.len(), 2);
        let rows = units[1].symbols.rows();
        assert_eq!(rows[0].position.line, 2);
    }

    #[test]
    fn parse_errors_skip_later_stages() {
        let unit = compile_one("{ int }$");
        assert!(unit.parser_log.has_errors());
        assert!(unit
            .semantic_log
            .entries()
            .iter()
            .any(|e| e.message.contains("skipped")));
        assert!(unit.image.iter().all(|&b| b == 0));
    }

    #[test]
    fn reports_concatenate_per_unit_sections() {
        let units = compile("{}$ {}$");
        let reports = reports(&units);
        assert!(reports.lexer.contains("--- Program 1 ---"));
        assert!(reports.lexer.contains("--- Program 2 ---"));
        assert!(reports.parser.contains("Program\n"));
        assert!(reports.codegen.contains("A9 00 EA 00"));
    }
}
