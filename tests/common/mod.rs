//! Small but complete documents shared by the integration tests
#![allow(dead_code)]

pub const SIGNATURE_BLOCK: &str = "-----BEGIN SIGNATURE-----\nAAAA\n-----END SIGNATURE-----\n";

pub const R_LINE: &str = "r seele AAoQ1DAR6kkoo19hBAX5K0QztNw bOzQ0RNlBtVY9a6RHG3b0f6CX7g 2019-05-31 23:13:53 67.161.31.147 9001 0\n";

pub fn server_descriptor(extra: &str) -> String {
    format!(
        "router saberrider2008 94.134.192.243 9001 0 0\n\
         platform Tor 0.2.6.2-alpha on Linux\n\
         published 2012-03-01 17:15:27\n\
         fingerprint D873 3048 FC8E C910 2466 AD8F 3098 622B F1BF 71FD\n\
         bandwidth 76800 102400 58012\n\
         {}\
         reject *:*\n\
         router-signature\n{}",
        extra, SIGNATURE_BLOCK
    )
}

pub fn extra_info(extra: &str) -> String {
    format!(
        "extra-info saberrider2008 D8733048FC8EC9102466AD8F3098622BF1BF71FD\n\
         published 2012-03-01 17:15:27\n\
         {}\
         router-signature\n{}",
        extra, SIGNATURE_BLOCK
    )
}

/// A consensus with the given header lines (after `known-flags`) and entries
pub fn consensus(header: &str, entries: &str) -> String {
    format!(
        "network-status-version 3\n\
         vote-status consensus\n\
         consensus-method 28\n\
         valid-after 2019-06-01 00:00:00\n\
         fresh-until 2019-06-01 01:00:00\n\
         valid-until 2019-06-01 03:00:00\n\
         voting-delay 300 300\n\
         known-flags Exit Fast Guard Running Stable Valid\n\
         {}\
         dir-source tor26 14C131DFC5C6F93646BE72FA1401C02A8DF2E8B4 86.59.21.38 86.59.21.38 80 443\n\
         contact Peter Palfrader\n\
         vote-digest 9EDB1B8A3F6DF6EF2F4AFDB0C0D5D7B6B5ECAF13\n\
         {}\
         directory-footer\n\
         bandwidth-weights Wbd=0 Wee=10000\n\
         directory-signature 14C131DFC5C6F93646BE72FA1401C02A8DF2E8B4 6C3A2B1A2B04B20C0C5A4A7F6E9D9A3BA5E6C1D1\n{}",
        header, entries, SIGNATURE_BLOCK
    )
}

const KEY: &str = "-----BEGIN RSA PUBLIC KEY-----\nMIIB\n-----END RSA PUBLIC KEY-----\n";

/// A vote with the given header lines (after `known-flags`) and entries
pub fn vote(header: &str, entries: &str) -> String {
    format!(
        "network-status-version 3\n\
         vote-status vote\n\
         consensus-methods 25 26 27 28\n\
         published 2019-06-01 00:00:00\n\
         valid-after 2019-06-01 01:00:00\n\
         fresh-until 2019-06-01 02:00:00\n\
         valid-until 2019-06-01 04:00:00\n\
         voting-delay 300 300\n\
         known-flags Authority Exit Fast Running Valid\n\
         {header}\
         dir-source dannenberg 0232AF901C31A04EE9848595AF9BB7620D4C5B2E dannenberg.torauth.de 193.23.244.244 80 443\n\
         contact Andreas Lehner\n\
         dir-key-certificate-version 3\n\
         fingerprint 0232AF901C31A04EE9848595AF9BB7620D4C5B2E\n\
         dir-key-published 2019-01-10 11:32:47\n\
         dir-key-expires 2019-07-10 11:32:47\n\
         dir-identity-key\n{key}\
         dir-signing-key\n{key}\
         dir-key-certification\n{sig}\
         {entries}\
         directory-footer\n\
         directory-signature 0232AF901C31A04EE9848595AF9BB7620D4C5B2E 6C3A2B1A2B04B20C0C5A4A7F6E9D9A3BA5E6C1D1\n{sig}",
        header = header,
        key = KEY,
        sig = SIGNATURE_BLOCK,
        entries = entries,
    )
}

pub const TORPERF: &str = "CONNECT=1338357901.42 DATACOMPLETE=1338357904.42 \
    DATAPERC50=1338357903.1 DATAREQUEST=1338357901.99 DATARESPONSE=1338357902.26 \
    FILESIZE=51200 NEGOTIATE=1338357901.52 READBYTES=51442 REQUEST=1338357901.99 \
    RESPONSE=1338357902.25 SOCKET=1338357901.41 SOURCE=moria START=1338357901.40 \
    WRITEBYTES=75";
