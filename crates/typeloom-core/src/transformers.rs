//! Explicit codecs attached to types
//!
//! A [`Transformer`] is a chain of steps that turns a value of its source
//! type into a value of the target type. Most steps hand their result to an
//! optional consumer; a step without a consumer produces the final value.
//! Every chain has a structural inverse, so the encoder is always derived
//! from the decoder and never written by hand.

use std::fmt;

use ordered_float::OrderedFloat;

use crate::attributes::TypeAttribute;
use crate::types::TypeRef;

type Consumer = Option<Box<Transformer>>;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Transformer {
    /// Read a value of `source` from the wire.
    Decode { source: TypeRef, consumer: Consumer },
    /// Write a value of `source` to the wire.
    Encode { source: TypeRef, consumer: Consumer },
    /// Parse the string into the next type.
    ParseString { source: TypeRef, consumer: Consumer },
    Stringify { source: TypeRef, consumer: Consumer },
    /// Decode every item with `item_transformer` into an array of
    /// `item_target`.
    ArrayDecode {
        source: TypeRef,
        item_target: TypeRef,
        item_transformer: Box<Transformer>,
        consumer: Consumer,
    },
    ArrayEncode {
        source: TypeRef,
        item_target: TypeRef,
        item_transformer: Box<Transformer>,
        consumer: Consumer,
    },
    /// Try each alternative in order; the first that succeeds wins.
    Choice {
        source: TypeRef,
        transformers: Vec<Transformer>,
    },
    /// Dispatch on the wire kind of the value. Each alternative starts with
    /// a decode of one member kind.
    DecodingChoice {
        source: TypeRef,
        alternatives: Vec<Transformer>,
    },
    /// Succeeds if the union value holds `member`, continuing with the
    /// member value.
    UnionMemberMatch {
        source: TypeRef,
        member: TypeRef,
        transformer: Box<Transformer>,
    },
    /// Wrap a member value into the target union.
    UnionInstantiation { source: TypeRef },
    /// Succeeds if the value equals `case`.
    StringMatch {
        source: TypeRef,
        case: String,
        transformer: Box<Transformer>,
    },
    /// Ignore the input and produce `result`.
    StringProducer {
        source: TypeRef,
        result: String,
        consumer: Consumer,
    },
    MinMaxLengthCheck {
        source: TypeRef,
        min: Option<usize>,
        max: Option<usize>,
        consumer: Consumer,
    },
    MinMaxValueCheck {
        source: TypeRef,
        min: Option<OrderedFloat<f64>>,
        max: Option<OrderedFloat<f64>>,
        consumer: Consumer,
    },
}

impl Transformer {
    pub fn decode(source: TypeRef, consumer: Option<Transformer>) -> Self {
        Transformer::Decode {
            source,
            consumer: consumer.map(Box::new),
        }
    }

    pub fn parse_string(source: TypeRef, consumer: Option<Transformer>) -> Self {
        Transformer::ParseString {
            source,
            consumer: consumer.map(Box::new),
        }
    }

    pub fn string_match(source: TypeRef, case: impl Into<String>, transformer: Transformer) -> Self {
        Transformer::StringMatch {
            source,
            case: case.into(),
            transformer: Box::new(transformer),
        }
    }

    pub fn string_producer(
        source: TypeRef,
        result: impl Into<String>,
        consumer: Option<Transformer>,
    ) -> Self {
        Transformer::StringProducer {
            source,
            result: result.into(),
            consumer: consumer.map(Box::new),
        }
    }

    pub fn source(&self) -> TypeRef {
        match self {
            Transformer::Decode { source, .. }
            | Transformer::Encode { source, .. }
            | Transformer::ParseString { source, .. }
            | Transformer::Stringify { source, .. }
            | Transformer::ArrayDecode { source, .. }
            | Transformer::ArrayEncode { source, .. }
            | Transformer::Choice { source, .. }
            | Transformer::DecodingChoice { source, .. }
            | Transformer::UnionMemberMatch { source, .. }
            | Transformer::UnionInstantiation { source }
            | Transformer::StringMatch { source, .. }
            | Transformer::StringProducer { source, .. }
            | Transformer::MinMaxLengthCheck { source, .. }
            | Transformer::MinMaxValueCheck { source, .. } => *source,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Transformer::Decode { .. } => "decode",
            Transformer::Encode { .. } => "encode",
            Transformer::ParseString { .. } => "parse-string",
            Transformer::Stringify { .. } => "stringify",
            Transformer::ArrayDecode { .. } => "array-decode",
            Transformer::ArrayEncode { .. } => "array-encode",
            Transformer::Choice { .. } => "choice",
            Transformer::DecodingChoice { .. } => "decoding-choice",
            Transformer::UnionMemberMatch { .. } => "union-member-match",
            Transformer::UnionInstantiation { .. } => "union-instantiation",
            Transformer::StringMatch { .. } => "string-match",
            Transformer::StringProducer { .. } => "string-producer",
            Transformer::MinMaxLengthCheck { .. } => "min-max-length-check",
            Transformer::MinMaxValueCheck { .. } => "min-max-value-check",
        }
    }

    /// The inverse chain.
    ///
    /// `target` is the type this chain produces; it becomes the source of
    /// the result. `continuation` is appended after the reversed chain.
    /// For linear chains reversing twice yields the original.
    ///
    /// Choices reverse branch by branch, so the steps around a choice move
    /// into each of its branches. Reversing a choice twice therefore gives
    /// an equivalent chain between the same types but not the same tree: a
    /// [`Transformer::DecodingChoice`] comes back as a plain
    /// [`Transformer::Choice`], and a string producer reversed out of a
    /// union branch reads from the union rather than from the member.
    pub fn reverse(&self, target: TypeRef, continuation: Option<Transformer>) -> Transformer {
        match self {
            Transformer::Decode { consumer, .. } => {
                reverse_step(consumer, target, continuation, |source, consumer| {
                    Transformer::Encode { source, consumer }
                })
            }
            Transformer::Encode { consumer, .. } => {
                reverse_step(consumer, target, continuation, |source, consumer| {
                    Transformer::Decode { source, consumer }
                })
            }
            Transformer::ParseString { consumer, .. } => {
                reverse_step(consumer, target, continuation, |source, consumer| {
                    Transformer::Stringify { source, consumer }
                })
            }
            Transformer::Stringify { consumer, .. } => {
                reverse_step(consumer, target, continuation, |source, consumer| {
                    Transformer::ParseString { source, consumer }
                })
            }
            Transformer::MinMaxLengthCheck { min, max, consumer, .. } => {
                reverse_step(consumer, target, continuation, |source, consumer| {
                    Transformer::MinMaxLengthCheck {
                        source,
                        min: *min,
                        max: *max,
                        consumer,
                    }
                })
            }
            Transformer::MinMaxValueCheck { min, max, consumer, .. } => {
                reverse_step(consumer, target, continuation, |source, consumer| {
                    Transformer::MinMaxValueCheck {
                        source,
                        min: *min,
                        max: *max,
                        consumer,
                    }
                })
            }
            Transformer::ArrayDecode {
                item_target,
                item_transformer,
                consumer,
                ..
            } => {
                let item_source = item_transformer.source();
                let items = Box::new(item_transformer.reverse(*item_target, None));
                reverse_step(consumer, target, continuation, |source, consumer| {
                    Transformer::ArrayEncode {
                        source,
                        item_target: item_source,
                        item_transformer: items,
                        consumer,
                    }
                })
            }
            Transformer::ArrayEncode {
                item_target,
                item_transformer,
                consumer,
                ..
            } => {
                let item_source = item_transformer.source();
                let items = Box::new(item_transformer.reverse(*item_target, None));
                reverse_step(consumer, target, continuation, |source, consumer| {
                    Transformer::ArrayDecode {
                        source,
                        item_target: item_source,
                        item_transformer: items,
                        consumer,
                    }
                })
            }
            Transformer::StringProducer {
                result, consumer, ..
            } => {
                let Some(continuation) = continuation else {
                    panic!("reversing a string producer requires a continuation");
                };
                match consumer {
                    None => Transformer::string_match(target, result.clone(), continuation),
                    Some(consumer) => {
                        let matcher =
                            Transformer::string_match(consumer.source(), result.clone(), continuation);
                        consumer.reverse(target, Some(matcher))
                    }
                }
            }
            Transformer::StringMatch {
                case, transformer, ..
            } => {
                let producer = Transformer::string_producer(target, case.clone(), continuation);
                transformer.reverse(target, Some(producer))
            }
            Transformer::UnionInstantiation { source } => {
                let Some(continuation) = continuation else {
                    panic!("reversing a union instantiation requires a continuation");
                };
                Transformer::UnionMemberMatch {
                    source: target,
                    member: *source,
                    transformer: Box::new(continuation),
                }
            }
            Transformer::UnionMemberMatch {
                member, transformer, ..
            } => {
                assert!(
                    continuation.is_none(),
                    "a union member match cannot be continued after reversal"
                );
                transformer.reverse(target, Some(Transformer::UnionInstantiation { source: *member }))
            }
            Transformer::Choice { transformers, .. }
            | Transformer::DecodingChoice {
                alternatives: transformers,
                ..
            } => reverse_choice(transformers, target, continuation),
        }
    }

    /// Every type ref mentioned anywhere in the chain.
    pub fn children(&self) -> Vec<TypeRef> {
        let mut refs = Vec::new();
        self.clone().map_refs(&mut |r| {
            refs.push(r);
            r
        });
        refs
    }

    /// The chain with every ref replaced through `map`.
    pub fn map_refs(self, map: &mut dyn FnMut(TypeRef) -> TypeRef) -> Transformer {
        match self {
            Transformer::Decode { source, consumer: c } => Transformer::Decode {
                source: map(source),
                consumer: map_consumer(c, map),
            },
            Transformer::Encode { source, consumer: c } => Transformer::Encode {
                source: map(source),
                consumer: map_consumer(c, map),
            },
            Transformer::ParseString { source, consumer: c } => Transformer::ParseString {
                source: map(source),
                consumer: map_consumer(c, map),
            },
            Transformer::Stringify { source, consumer: c } => Transformer::Stringify {
                source: map(source),
                consumer: map_consumer(c, map),
            },
            Transformer::ArrayDecode {
                source,
                item_target,
                item_transformer,
                consumer: c,
            } => Transformer::ArrayDecode {
                source: map(source),
                item_target: map(item_target),
                item_transformer: Box::new(item_transformer.map_refs(map)),
                consumer: map_consumer(c, map),
            },
            Transformer::ArrayEncode {
                source,
                item_target,
                item_transformer,
                consumer: c,
            } => Transformer::ArrayEncode {
                source: map(source),
                item_target: map(item_target),
                item_transformer: Box::new(item_transformer.map_refs(map)),
                consumer: map_consumer(c, map),
            },
            Transformer::Choice {
                source,
                transformers,
            } => Transformer::Choice {
                source: map(source),
                transformers: transformers.into_iter().map(|t| t.map_refs(map)).collect(),
            },
            Transformer::DecodingChoice {
                source,
                alternatives,
            } => Transformer::DecodingChoice {
                source: map(source),
                alternatives: alternatives.into_iter().map(|t| t.map_refs(map)).collect(),
            },
            Transformer::UnionMemberMatch {
                source,
                member,
                transformer,
            } => Transformer::UnionMemberMatch {
                source: map(source),
                member: map(member),
                transformer: Box::new(transformer.map_refs(map)),
            },
            Transformer::UnionInstantiation { source } => Transformer::UnionInstantiation {
                source: map(source),
            },
            Transformer::StringMatch {
                source,
                case,
                transformer,
            } => Transformer::StringMatch {
                source: map(source),
                case,
                transformer: Box::new(transformer.map_refs(map)),
            },
            Transformer::StringProducer {
                source,
                result,
                consumer: c,
            } => Transformer::StringProducer {
                source: map(source),
                result,
                consumer: map_consumer(c, map),
            },
            Transformer::MinMaxLengthCheck {
                source,
                min,
                max,
                consumer: c,
            } => Transformer::MinMaxLengthCheck {
                source: map(source),
                min,
                max,
                consumer: map_consumer(c, map),
            },
            Transformer::MinMaxValueCheck {
                source,
                min,
                max,
                consumer: c,
            } => Transformer::MinMaxValueCheck {
                source: map(source),
                min,
                max,
                consumer: map_consumer(c, map),
            },
        }
    }

    fn consumer(&self) -> Option<&Transformer> {
        match self {
            Transformer::Decode { consumer, .. }
            | Transformer::Encode { consumer, .. }
            | Transformer::ParseString { consumer, .. }
            | Transformer::Stringify { consumer, .. }
            | Transformer::ArrayDecode { consumer, .. }
            | Transformer::ArrayEncode { consumer, .. }
            | Transformer::StringProducer { consumer, .. }
            | Transformer::MinMaxLengthCheck { consumer, .. }
            | Transformer::MinMaxValueCheck { consumer, .. } => consumer.as_deref(),
            Transformer::UnionMemberMatch { transformer, .. }
            | Transformer::StringMatch { transformer, .. } => Some(transformer),
            Transformer::Choice { .. }
            | Transformer::DecodingChoice { .. }
            | Transformer::UnionInstantiation { .. } => None,
        }
    }
}

fn map_consumer(consumer: Consumer, map: &mut dyn FnMut(TypeRef) -> TypeRef) -> Consumer {
    consumer.map(|c| Box::new(c.map_refs(map)))
}

/// Reverse a step that hands its result to `consumer`: the consumer is
/// reversed first and the inverted step becomes its continuation.
fn reverse_step(
    consumer: &Consumer,
    target: TypeRef,
    continuation: Option<Transformer>,
    invert: impl FnOnce(TypeRef, Consumer) -> Transformer,
) -> Transformer {
    let continuation = continuation.map(Box::new);
    match consumer {
        None => invert(target, continuation),
        Some(consumer) => {
            let inverted = invert(consumer.source(), continuation);
            consumer.reverse(target, Some(inverted))
        }
    }
}

fn reverse_choice(
    transformers: &[Transformer],
    target: TypeRef,
    continuation: Option<Transformer>,
) -> Transformer {
    let reversed: Vec<Transformer> = transformers
        .iter()
        .map(|t| t.reverse(target, continuation.clone()))
        .collect();

    // Matches on the same member can share one match around a choice.
    let members: Vec<TypeRef> = reversed
        .iter()
        .filter_map(|t| match t {
            Transformer::UnionMemberMatch { member, .. } => Some(*member),
            _ => None,
        })
        .collect();
    if !members.is_empty()
        && members.len() == reversed.len()
        && members.iter().all(|m| *m == members[0])
    {
        let inner: Vec<Transformer> = reversed
            .into_iter()
            .filter_map(|t| match t {
                Transformer::UnionMemberMatch { transformer, .. } => Some(*transformer),
                _ => None,
            })
            .collect();
        return Transformer::UnionMemberMatch {
            source: target,
            member: members[0],
            transformer: Box::new(Transformer::Choice {
                source: members[0],
                transformers: inner,
            }),
        };
    }
    Transformer::Choice {
        source: target,
        transformers: reversed,
    }
}

impl fmt::Display for Transformer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.name(), self.source())?;
        match self {
            Transformer::StringMatch { case, .. } => write!(f, " {:?}", case)?,
            Transformer::StringProducer { result, .. } => write!(f, " {:?}", result)?,
            Transformer::UnionMemberMatch { member, .. } => write!(f, " {}", member)?,
            Transformer::ArrayDecode {
                item_transformer, ..
            }
            | Transformer::ArrayEncode {
                item_transformer, ..
            } => write!(f, " [{}]", item_transformer)?,
            Transformer::Choice { transformers, .. }
            | Transformer::DecodingChoice {
                alternatives: transformers,
                ..
            } => {
                let alternatives: Vec<String> = transformers.iter().map(|t| t.to_string()).collect();
                write!(f, " {{{}}}", alternatives.join(" | "))?;
            }
            _ => {}
        }
        if let Some(next) = self.consumer() {
            write!(f, " -> {}", next)?;
        }
        Ok(())
    }
}

/// The codec of a type: how a value of `source` becomes a `target`.
///
/// Stored as an attribute on the type that stands in for the target on the
/// wire. It takes part in identity, so two types with different codecs are
/// never merged.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Transformation {
    source: TypeRef,
    target: TypeRef,
    transformer: Transformer,
}

impl Transformation {
    pub fn new(source: TypeRef, target: TypeRef, transformer: Transformer) -> Self {
        Self {
            source,
            target,
            transformer,
        }
    }

    pub fn source(&self) -> TypeRef {
        self.source
    }

    pub fn target(&self) -> TypeRef {
        self.target
    }

    pub fn transformer(&self) -> &Transformer {
        &self.transformer
    }

    /// The encoding direction.
    pub fn reverse(&self) -> Transformation {
        Transformation {
            source: self.target,
            target: self.source,
            transformer: self.transformer.reverse(self.target, None),
        }
    }
}

impl TypeAttribute for Transformation {
    const KIND: &'static str = "transformation";
    const IN_IDENTITY: bool = true;

    fn combine(&self, other: &Self) -> Option<Self> {
        assert_eq!(self, other, "conflicting transformations cannot be merged");
        Some(self.clone())
    }

    fn children(&self) -> Vec<TypeRef> {
        let mut children = vec![self.source, self.target];
        children.extend(self.transformer.children());
        children
    }

    fn reconstitute(&self, map: &mut dyn FnMut(TypeRef) -> TypeRef) -> Self {
        Transformation {
            source: map(self.source),
            target: map(self.target),
            transformer: self.transformer.clone().map_refs(map),
        }
    }

    fn stringify(&self) -> Option<String> {
        Some(format!("{} => {}: {}", self.source, self.target, self.transformer))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn r(index: usize) -> TypeRef {
        TypeRef::new(0, index)
    }

    #[test]
    fn test_linear_chain_reverses_twice_to_original() {
        let (json, string, int) = (r(0), r(1), r(2));
        let decode = Transformer::decode(
            json,
            Some(Transformer::parse_string(
                string,
                Some(Transformer::MinMaxValueCheck {
                    source: int,
                    min: Some(OrderedFloat(0.0)),
                    max: None,
                    consumer: None,
                }),
            )),
        );

        let encode = decode.reverse(int, None);
        let Transformer::MinMaxValueCheck { source, consumer, .. } = &encode else {
            panic!("expected the check first, got {}", encode);
        };
        assert_eq!(*source, int);
        assert!(matches!(
            consumer.as_deref(),
            Some(Transformer::Stringify { source, .. }) if *source == int
        ));
        assert_eq!(encode.reverse(json, None), decode);
    }

    #[test]
    fn test_enum_choice_round_trips() {
        let (string, colors) = (r(0), r(1));
        let cases = ["blue", "red"];
        let decode = Transformer::Choice {
            source: string,
            transformers: cases
                .iter()
                .map(|c| Transformer::string_match(string, *c, Transformer::string_producer(string, *c, None)))
                .collect(),
        };

        let encode = decode.reverse(colors, None);
        let Transformer::Choice { source, transformers } = &encode else {
            panic!("expected a choice, got {}", encode);
        };
        assert_eq!(*source, colors);
        assert!(transformers
            .iter()
            .all(|t| matches!(t, Transformer::StringMatch { source, .. } if *source == colors)));
        assert_eq!(encode.reverse(string, None), decode);
    }

    #[test]
    fn test_union_instantiation_reverses_to_member_match() {
        let (string, int, union) = (r(0), r(1), r(2));
        let decode = Transformer::parse_string(string, Some(Transformer::UnionInstantiation { source: int }));
        let encode = decode.reverse(union, None);
        assert_eq!(
            encode,
            Transformer::UnionMemberMatch {
                source: union,
                member: int,
                transformer: Box::new(Transformer::Stringify {
                    source: int,
                    consumer: None,
                }),
            }
        );
        assert_eq!(encode.reverse(string, None), decode);
    }

    #[test]
    fn test_array_decode_reverses_item_chain() {
        let (raw_array, string, target_array, int) = (r(0), r(1), r(2), r(3));
        let decode = Transformer::ArrayDecode {
            source: raw_array,
            item_target: int,
            item_transformer: Box::new(Transformer::parse_string(string, None)),
            consumer: None,
        };
        let encode = decode.reverse(target_array, None);
        let Transformer::ArrayEncode {
            source,
            item_target,
            item_transformer,
            ..
        } = &encode
        else {
            panic!("expected an array encode, got {}", encode);
        };
        assert_eq!((*source, *item_target), (target_array, string));
        assert_eq!(item_transformer.source(), int);
        assert_eq!(encode.reverse(raw_array, None), decode);
    }

    #[test]
    fn test_transformation_reverse_swaps_ends() {
        let (string, int) = (r(0), r(1));
        let transformation = Transformation::new(
            string,
            int,
            Transformer::decode(string, Some(Transformer::parse_string(string, None))),
        );
        let reversed = transformation.reverse();
        assert_eq!((reversed.source(), reversed.target()), (int, string));
        assert_eq!(reversed.reverse(), transformation);
        assert_eq!(transformation.children(), vec![string, int, string, string]);
    }

    #[test]
    #[should_panic(expected = "requires a continuation")]
    fn test_bare_union_instantiation_cannot_reverse() {
        Transformer::UnionInstantiation { source: r(0) }.reverse(r(1), None);
    }
}
