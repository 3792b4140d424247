//! Standard-library catalogue.
//!
//! A static, read-only table of `(name, documentation, signature)` triples
//! for the Jsonnet `std` object. Each signature is plain annotation-grammar
//! text run through [`crate::annotation::parse`] once per thread, via an
//! `OnceLock`-based lazy singleton. The resulting `Value` is referentially
//! unique per thread so callers can `Rc::ptr_eq` it to answer "is this
//! `std`?" in O(1) — identity is per-thread rather than process-global
//! because the deducer's `Value`/`TypeInfo` tree is built from `Rc`, not
//! `Arc`: a `Value` never escapes the worker thread handling one query.
//!
//! The entries below cover the commonly used subset of the real Jsonnet
//! `std` library: type predicates, string/array operations, `format`,
//! object introspection, and math, grounded in the publicly documented
//! Jsonnet standard library.

use std::cell::RefCell;
use std::rc::Rc;

use crate::value::{FieldInfo, TypeInfo, Value};

struct Entry {
    name: &'static str,
    doc: &'static str,
    signature: &'static str,
}

const ENTRIES: &[Entry] = &[
    Entry { name: "thisFile", doc: "The path to the current file.", signature: "string" },
    Entry { name: "type", doc: "Returns the type of the value as a string.", signature: "function(x) -> string" },
    Entry { name: "isString", doc: "Returns true if x is a string.", signature: "function(x) -> boolean" },
    Entry { name: "isNumber", doc: "Returns true if x is a number.", signature: "function(x) -> boolean" },
    Entry { name: "isBoolean", doc: "Returns true if x is a boolean.", signature: "function(x) -> boolean" },
    Entry { name: "isObject", doc: "Returns true if x is an object.", signature: "function(x) -> boolean" },
    Entry { name: "isArray", doc: "Returns true if x is an array.", signature: "function(x) -> boolean" },
    Entry { name: "isFunction", doc: "Returns true if x is a function.", signature: "function(x) -> boolean" },
    Entry { name: "length", doc: "Returns the length of a string, array, object or function.", signature: "function(x) -> number" },
    Entry { name: "get", doc: "Returns field of an object, or a default value if it doesn't exist.", signature: "function(o: object, f: string) -> any" },
    Entry { name: "objectHas", doc: "Returns true if the object has the field (non-hidden).", signature: "function(o: object, f: string) -> boolean" },
    Entry { name: "objectHasAll", doc: "Returns true if the object has the field (including hidden).", signature: "function(o: object, f: string) -> boolean" },
    Entry { name: "objectFields", doc: "Returns an array of the visible fields of an object.", signature: "function(o: object) -> array[string]" },
    Entry { name: "objectFieldsAll", doc: "Returns an array of all fields of an object, including hidden.", signature: "function(o: object) -> array[string]" },
    Entry { name: "objectValues", doc: "Returns an array of the visible values of an object.", signature: "function(o: object) -> array" },
    Entry { name: "objectValuesAll", doc: "Returns an array of all values of an object, including hidden.", signature: "function(o: object) -> array" },
    Entry { name: "objectRemoveKey", doc: "Returns a copy of the object with the given field removed.", signature: "function(o: object, f: string) -> object" },
    Entry { name: "mergePatch", doc: "Applies an RFC 7396 JSON Merge Patch.", signature: "function(target, patch) -> any" },
    Entry { name: "prune", doc: "Recursively removes nulls, empty arrays and empty objects.", signature: "function(a) -> any" },
    Entry { name: "map", doc: "Applies a function to every element of an array.", signature: "function(func: function(elem: A) -> B, arr: array[A]) -> array[B]" },
    Entry { name: "mapWithIndex", doc: "Applies a function to every element and index of an array.", signature: "function(func: function(i: number, elem: A) -> B, arr: array[A]) -> array[B]" },
    Entry { name: "filter", doc: "Returns the elements of arr for which func returns true.", signature: "function(func: function(elem: A) -> boolean, arr: array[A]) -> array[A]" },
    Entry { name: "foldl", doc: "Left fold over an array.", signature: "function(func: function(acc: B, elem: A) -> B, arr: array[A], init: B) -> B" },
    Entry { name: "foldr", doc: "Right fold over an array.", signature: "function(func: function(elem: A, acc: B) -> B, arr: array[A], init: B) -> B" },
    Entry { name: "flatMap", doc: "Applies a function returning an array to every element, then flattens.", signature: "function(func: function(elem: A) -> array[B], arr: array[A]) -> array[B]" },
    Entry { name: "filterMap", doc: "Filters then maps over an array.", signature: "function(filter_func: function(elem: A) -> boolean, map_func: function(elem: A) -> B, arr: array[A]) -> array[B]" },
    Entry { name: "range", doc: "Returns an array of numbers from `from` to `to` inclusive.", signature: "function(from: number, to: number) -> array[number]" },
    Entry { name: "repeat", doc: "Repeats an array or string n times.", signature: "function(what, count: number) -> any" },
    Entry { name: "join", doc: "Joins an array of strings/arrays with a separator.", signature: "function(sep, arr: array) -> any" },
    Entry { name: "lines", doc: "Concatenates an array of strings, adding a newline after each.", signature: "function(arr: array[string]) -> string" },
    Entry { name: "split", doc: "Splits a string on every occurrence of c.", signature: "function(str: string, c: string) -> array[string]" },
    Entry { name: "splitLimit", doc: "Like split, but stops after at most `maxsplits` splits.", signature: "function(str: string, c: string, maxsplits: number) -> array[string]" },
    Entry { name: "substr", doc: "Returns a substring of str starting at from, of length len.", signature: "function(str: string, from: number, len: number) -> string" },
    Entry { name: "startsWith", doc: "Returns true if a starts with the string b.", signature: "function(a: string, b: string) -> boolean" },
    Entry { name: "endsWith", doc: "Returns true if a ends with the string b.", signature: "function(a: string, b: string) -> boolean" },
    Entry { name: "stripChars", doc: "Removes the characters in chars from the start and end of str.", signature: "function(str: string, chars: string) -> string" },
    Entry { name: "stringChars", doc: "Splits a string into an array of one-character strings.", signature: "function(str: string) -> array[string]" },
    Entry { name: "asciiUpper", doc: "Converts ASCII letters in str to upper case.", signature: "function(str: string) -> string" },
    Entry { name: "asciiLower", doc: "Converts ASCII letters in str to lower case.", signature: "function(str: string) -> string" },
    Entry { name: "parseInt", doc: "Parses a signed decimal integer string.", signature: "function(str: string) -> number" },
    Entry { name: "parseJson", doc: "Parses a JSON string into a Jsonnet value.", signature: "function(str: string) -> any" },
    Entry { name: "toString", doc: "Converts a value to a string.", signature: "function(a) -> string" },
    Entry { name: "format", doc: "Formats a string using Python-style %-formatting.", signature: "function(str: string, vals) -> string" },
    Entry { name: "escapeStringJson", doc: "Escapes a string for embedding in JSON.", signature: "function(str: string) -> string" },
    Entry { name: "manifestJson", doc: "Serializes a value as a JSON string, with a standard indentation.", signature: "function(value) -> string" },
    Entry { name: "manifestJsonMinified", doc: "Serializes a value as a minified JSON string.", signature: "function(value) -> string" },
    Entry { name: "manifestYamlDoc", doc: "Serializes a value as a YAML document.", signature: "function(value) -> string" },
    Entry { name: "trace", doc: "Prints str to stderr as a side effect, then evaluates to rest.", signature: "function(str: string, rest: A) -> A" },
    Entry { name: "abs", doc: "Returns the absolute value of n.", signature: "function(n: number) -> number" },
    Entry { name: "max", doc: "Returns the larger of a and b.", signature: "function(a: number, b: number) -> number" },
    Entry { name: "min", doc: "Returns the smaller of a and b.", signature: "function(a: number, b: number) -> number" },
    Entry { name: "pow", doc: "Returns x raised to the power n.", signature: "function(x: number, n: number) -> number" },
    Entry { name: "sqrt", doc: "Returns the square root of x.", signature: "function(x: number) -> number" },
    Entry { name: "exp", doc: "Returns e raised to the power x.", signature: "function(x: number) -> number" },
    Entry { name: "ceil", doc: "Rounds x up to the nearest integer.", signature: "function(x: number) -> number" },
    Entry { name: "floor", doc: "Rounds x down to the nearest integer.", signature: "function(x: number) -> number" },
    Entry { name: "round", doc: "Rounds x to the nearest integer.", signature: "function(x: number) -> number" },
    Entry { name: "clamp", doc: "Clamps x to the inclusive range [minVal, maxVal].", signature: "function(x: number, minVal: number, maxVal: number) -> number" },
    Entry { name: "sign", doc: "Returns the sign of n: -1, 0, or 1.", signature: "function(n: number) -> number" },
    Entry { name: "all", doc: "Returns true if all elements of arr are true.", signature: "function(arr: array[boolean]) -> boolean" },
    Entry { name: "any", doc: "Returns true if any element of arr is true.", signature: "function(arr: array[boolean]) -> boolean" },
    Entry { name: "sort", doc: "Sorts an array using the default or a key function.", signature: "function(arr: array[A]) -> array[A]" },
    Entry { name: "uniq", doc: "Removes adjacent duplicate elements from a sorted array.", signature: "function(arr: array[A]) -> array[A]" },
    Entry { name: "reverse", doc: "Reverses an array.", signature: "function(arr: array[A]) -> array[A]" },
    Entry { name: "set", doc: "Creates a set (sorted, deduplicated array) from arr.", signature: "function(arr: array[A]) -> array[A]" },
    Entry { name: "setUnion", doc: "Returns the union of two sets.", signature: "function(a: array[A], b: array[A]) -> array[A]" },
    Entry { name: "setInter", doc: "Returns the intersection of two sets.", signature: "function(a: array[A], b: array[A]) -> array[A]" },
    Entry { name: "setDiff", doc: "Returns the set difference of two sets.", signature: "function(a: array[A], b: array[A]) -> array[A]" },
    Entry { name: "setMember", doc: "Returns true if x is a member of the set arr.", signature: "function(x: A, arr: array[A]) -> boolean" },
    Entry { name: "assertEqual", doc: "Raises an error if a and b are not equal, otherwise returns true.", signature: "function(a, b) -> boolean" },
    Entry { name: "base64", doc: "Encodes a string or byte array as base64.", signature: "function(input) -> string" },
    Entry { name: "base64Decode", doc: "Decodes a base64-encoded string to a string.", signature: "function(str: string) -> string" },
    Entry { name: "md5", doc: "Returns the MD5 hash of a string.", signature: "function(s: string) -> string" },
];

thread_local! {
    static STD_VALUE: RefCell<Option<Rc<Value>>> = const { RefCell::new(None) };
}

/// Returns the standard-library `Value`. Referentially unique within the
/// calling thread: two calls return `Value`s whose `node`/field `Rc`s
/// trace back to the same underlying `Rc<Vec<FieldInfo>>` allocation, so
/// `Rc::ptr_eq` on the inner `fields` answers "is this `std`?" in O(1).
pub fn std_value() -> Value {
    let rc = STD_VALUE.with(|cell| {
        let mut slot = cell.borrow_mut();
        if slot.is_none() {
            *slot = Some(Rc::new(build()));
        }
        slot.as_ref().unwrap().clone()
    });
    (*rc).clone()
}

/// Whether `type_` is (or derives from) the standard-library object, by
/// comparing the identity of its `fields` allocation against the
/// singleton built by [`std_value`].
pub fn is_std(type_: &TypeInfo) -> bool {
    let TypeInfo::Object { fields: Some(fields), .. } = type_ else {
        return false;
    };
    STD_VALUE.with(|cell| {
        let slot = cell.borrow();
        if let Some(std_rc) = slot.as_ref()
            && let TypeInfo::Object {
                fields: Some(std_fields),
                ..
            } = &std_rc.type_
        {
            return Rc::ptr_eq(fields, std_fields);
        }
        false
    })
}

fn build() -> Value {
    let fields: Vec<FieldInfo> = ENTRIES
        .iter()
        .map(|e| {
            let type_ = crate::value::parse_type_hint(e.signature);
            FieldInfo {
                name: Rc::from(e.name),
                range: None,
                comment: vec![e.doc.to_string()],
                hidden: false,
                type_hint: None,
                type_,
                origin_node: None,
            }
        })
        .collect();
    Value {
        range: None,
        comment: Vec::new(),
        node: None,
        type_: TypeInfo::object(fields, true),
        type_hint: None,
    }
}

/// All entry names, in declaration order — used by the query surface for
/// the `std.`-prefix completion list.
pub fn entry_names() -> impl Iterator<Item = &'static str> {
    ENTRIES.iter().map(|e| e.name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn std_value_has_known_fields() {
        let v = std_value();
        assert!(v.type_.lookup_field("length").is_some());
        assert!(v.type_.lookup_field("map").is_some());
        assert!(v.type_.lookup_field("doesNotExist").is_none());
    }

    #[test]
    fn std_value_is_referentially_stable() {
        let a = std_value();
        let b = std_value();
        assert!(is_std(&a.type_));
        assert!(is_std(&b.type_));
    }

    #[test]
    fn all_fields_known() {
        let v = std_value();
        match v.type_ {
            TypeInfo::Object {
                all_fields_known, ..
            } => assert!(all_fields_known),
            _ => panic!("expected object"),
        }
    }
}
