/// The tokenizer takes the source input, mapping it into a sequence of
/// classified tokens with a movable cursor.
pub mod tokenizer;

/// The compilation engine walks the grammar rule by rule, resolving names
/// through the symbol table and emitting stack-machine instructions as it
/// goes — there is no intermediate tree.
pub mod engine;

pub mod emitter;
pub mod symbol_table;
pub mod token;
