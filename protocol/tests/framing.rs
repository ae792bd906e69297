#![allow(clippy::unwrap_used, clippy::expect_used)]

use klish_protocol::FrameDecoder;
use klish_protocol::KtpCmd;
use klish_protocol::Msg;
use klish_protocol::Param;
use klish_protocol::ParamType;
use klish_protocol::Status;
use pretty_assertions::assert_eq;

fn sample_messages() -> Vec<Msg> {
    let mut auth = Msg::new(KtpCmd::Auth, Status::TTY_STDIN | Status::TTY_STDOUT);
    auth.add_str(ParamType::Line, "");

    let mut auth_ack = Msg::new(KtpCmd::AuthAck, Status::empty());
    auth_ack.set_retcode(0);
    auth_ack.add_str(ParamType::Prompt, "router# ");
    auth_ack.add_hotkey("^Z", "exit");

    let mut cmd = Msg::new(KtpCmd::Cmd, Status::DRY_RUN);
    cmd.add_str(ParamType::Line, "show log | grep warn");

    let mut stdout = Msg::new(KtpCmd::Stdout, Status::empty());
    stdout.add(ParamType::Line, vec![0u8, 1, 2, 254, 255]);

    let mut cmd_ack = Msg::new(KtpCmd::CmdAck, Status::EXIT);
    cmd_ack.set_retcode(5);
    cmd_ack.add_str(ParamType::Error, "not found");

    let mut winch = Msg::new(KtpCmd::Notification, Status::empty());
    winch.add_winch(80, 25);

    // An unknown parameter type must survive the round trip untouched.
    let mut exotic = Msg::new(KtpCmd::HelpAck, Status::INCOMPLETED);
    exotic.params.push(Param {
        ty: 0x7f07,
        data: b"opaque".to_vec(),
    });
    exotic.add_str(ParamType::Prefix, "sh");
    exotic.add_str(ParamType::Line, "Show running state");

    // Payload that embeds bytes which look like a frame header.
    let mut tricky = Msg::new(KtpCmd::Stderr, Status::ERROR);
    tricky.add(ParamType::Line, Msg::new(KtpCmd::Exit, Status::EXIT).encode().to_vec());

    vec![auth, auth_ack, cmd, stdout, cmd_ack, winch, exotic, tricky]
}

#[test]
fn encode_decode_roundtrip() {
    for msg in sample_messages() {
        let decoded = Msg::decode(&msg.encode()).expect("decode");
        assert_eq!(decoded, msg);
    }
}

#[test]
fn stream_decoding_is_split_invariant() {
    let msgs = sample_messages();
    let mut stream = Vec::new();
    for m in &msgs {
        stream.extend_from_slice(&m.encode());
    }

    for chunk in [1usize, 2, 3, 5, 7, 16, 19, 20, 21, 64, stream.len()] {
        let mut dec = FrameDecoder::new();
        let mut got = Vec::new();
        for piece in stream.chunks(chunk) {
            got.extend(dec.feed(piece).expect("feed"));
        }
        assert_eq!(got, msgs, "chunk size {chunk}");
        assert_eq!(dec.pending(), 0, "chunk size {chunk}");
    }
}

#[test]
fn byte_at_a_time_never_yields_partial_messages() {
    let msgs = sample_messages();
    let mut stream = Vec::new();
    for m in &msgs {
        stream.extend_from_slice(&m.encode());
    }
    let mut dec = FrameDecoder::new();
    let mut count = 0;
    for b in stream {
        count += dec.feed(&[b]).expect("feed").len();
    }
    assert_eq!(count, msgs.len());
}
