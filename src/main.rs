fn main() -> anyhow::Result<()> {
    lecog_lib::run()
}
