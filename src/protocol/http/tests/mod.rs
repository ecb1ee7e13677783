mod codec;
mod codec_proptest;
mod request;
