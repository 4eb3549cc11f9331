use crate::wire::codes::{MsgType, OpCode};
use crate::wire::header::Header;

#[test]
fn header_round_trips_through_encode_decode() {
    let original = Header::request(OpCode::Write, "alice")
        .with_filename("notes.txt")
        .with_foldername("drafts")
        .with_checkpoint_tag("v1")
        .with_sentence_index(2)
        .with_word_index(5)
        .with_flags(0b11)
        .with_data_length(42);

    let encoded = original.encode();
    let decoded = Header::decode(&encoded).expect("valid header decodes");

    assert_eq!(decoded.msg_type as u8, MsgType::Request as u8);
    assert_eq!(decoded.op_code as u16, OpCode::Write as u16);
    assert_eq!(decoded.username, "alice");
    assert_eq!(decoded.filename, "notes.txt");
    assert_eq!(decoded.foldername, "drafts");
    assert_eq!(decoded.checkpoint_tag, "v1");
    assert_eq!(decoded.sentence_index, 2);
    assert_eq!(decoded.word_index, 5);
    assert_eq!(decoded.flags, 0b11);
    assert_eq!(decoded.data_length, 42);
}

#[test]
fn unrecognized_op_code_decodes_to_none() {
    let mut encoded = Header::request(OpCode::Read, "bob").encode();
    // op_code sits right after the one-byte msg_type.
    encoded[1] = 0xFF;
    encoded[2] = 0xFF;
    assert!(Header::decode(&encoded).is_none());
}

#[test]
fn fixed_string_fields_truncate_rather_than_overflow() {
    let long_name = "x".repeat(10_000);
    let header = Header::request(OpCode::Create, "carol").with_filename(&long_name);
    let encoded = header.encode();
    let decoded = Header::decode(&encoded).unwrap();
    assert_eq!(decoded.filename.len(), super::header::FILENAME_LEN);
}
